use std::fs;

use adsign_core::{key_fingerprint, AdTechIdentifier, SignatureManager, SignedContextualAds};
use anyhow::{Context, Result};
use tracing::debug;

use crate::args::{Cli, Command, KeysArgs, VerifyArgs};
use crate::store_file;

/// Runs one subcommand; the returned code becomes the process exit
/// status (0 verified/found, 1 not, 2 usage or I/O failure via main).
pub fn dispatch(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Command::Keys(args) => keys(args),
        Command::Verify(args) => verify(args),
    }
}

fn keys(args: KeysArgs) -> Result<i32> {
    let store = store_file::load(&args.store)?;
    debug!(store = %args.store.display(), "loaded key store");
    let manager = SignatureManager::new(store.clone(), store);
    let ad_tech = AdTechIdentifier::new(args.ad_tech);

    let keys = manager
        .fetch_public_keys_for_ad_tech(&ad_tech)
        .with_context(|| format!("fetching signing keys for {ad_tech}"))?;
    if keys.is_empty() {
        println!("no signing keys registered for {ad_tech}");
        return Ok(1);
    }
    for (i, key) in keys.iter().enumerate() {
        println!("{i}: {} ({} bytes)", key_fingerprint(key), key.len());
    }
    Ok(0)
}

fn verify(args: VerifyArgs) -> Result<i32> {
    let store = store_file::load(&args.store)?;
    let text = fs::read_to_string(&args.payload)
        .with_context(|| format!("reading payload {}", args.payload.display()))?;
    let ads: SignedContextualAds = serde_json::from_str(&text)
        .with_context(|| format!("parsing payload {}", args.payload.display()))?;
    debug!(buyer = %ads.buyer, "verifying payload");

    let manager = SignatureManager::new(store.clone(), store);
    let seller = AdTechIdentifier::new(args.seller);
    let buyer = ads.buyer.clone();
    let outcome = manager.verify(&buyer, &seller, &args.caller_package, &ads);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.verified {
        println!(
            "verified: signature matches one of {} key(s) for {buyer}",
            outcome.keys_fetched
        );
    } else {
        let reason = outcome
            .failure_reason
            .map_or_else(|| "unclassified".to_owned(), |r| format!("{r:?}"));
        println!(
            "NOT verified: {reason} (keys fetched {}, malformed {}, failed to match {})",
            outcome.keys_fetched, outcome.keys_malformed, outcome.keys_failed_to_match
        );
    }
    Ok(i32::from(!outcome.verified))
}
