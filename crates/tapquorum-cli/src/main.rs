//! tapquorum: build k-of-n Taproot script trees from a config file.
//!
//! # Usage
//!
//! ```bash
//! tapquorum --config tapquorum.toml address
//! tapquorum --config tapquorum.toml match --signer <hex> --signer <hex>
//! tapquorum --config tapquorum.toml --validate
//! ```

mod config;

use anyhow::{Context, Result};
use bitcoin::key::XOnlyPublicKey;
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;
use tapquorum_policy::{narrow_to_leaf, ScriptTree, WeightingScheme};

enum Command {
    Address,
    Match,
}

fn main() -> Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("tapquorum.toml");
    let mut validate_only = false;
    let mut json_output = false;
    let mut command = None;
    let mut signers = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--signer" | "-s" => {
                i += 1;
                if i < args.len() {
                    signers.push(args[i].clone());
                } else {
                    anyhow::bail!("--signer requires a hex x-only key");
                }
            }
            "--validate" => {
                validate_only = true;
            }
            "--json" => {
                json_output = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("tapquorum {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "address" => command = Some(Command::Address),
            "match" => command = Some(Command::Match),
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // Load config
    let mut cfg = config::Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Apply env overrides
    cfg.apply_env_overrides();

    // Validate
    cfg.validate().context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &cfg.logging.level);
    env_logger::init();

    if validate_only {
        println!("Configuration is valid.");
        println!("  Network:      {}", cfg.bitcoin.network);
        println!(
            "  Policy:       {}-of-{}",
            cfg.policy.threshold,
            cfg.policy.keys.len()
        );
        println!("  Internal key: {}", cfg.policy.internal_key);
        println!("  Strategy:     {}", cfg.policy.strategy);
        println!("  Weighting:    {}", cfg.policy.weighting);
        return Ok(());
    }

    let Some(command) = command else {
        print_help();
        anyhow::bail!("No command given");
    };

    let policy = cfg.threshold_policy()?;
    let weighting: WeightingScheme = cfg.weighting()?;
    let tree = ScriptTree::build(&policy, cfg.strategy()?, &weighting)
        .context("Failed to build script tree")?;

    match command {
        Command::Address => print_address(&tree, cfg.network(), json_output),
        Command::Match => print_match(&tree, &signers, json_output),
    }
}

fn print_address(tree: &ScriptTree, network: bitcoin::Network, json_output: bool) -> Result<()> {
    let address = tree.address(network);
    let merkle_root = tree.merkle_root().map(|r| r.to_string());

    if json_output {
        let leaves: Vec<_> = tree
            .leaves()
            .iter()
            .map(|leaf| {
                json!({
                    "keys": leaf.required_keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                    "weight": leaf.weight,
                    "depth": tree.leaf_depth(leaf),
                    "script": hex::encode(leaf.script.as_bytes()),
                })
            })
            .collect();
        let out = json!({
            "address": address.to_string(),
            "output_key": tree.output_key().to_string(),
            "internal_key": tree.internal_key().to_string(),
            "merkle_root": merkle_root,
            "leaves": leaves,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Address:      {}", address);
    println!("Output key:   {}", tree.output_key());
    println!("Internal key: {}", tree.internal_key());
    println!("Merkle root:  {}", merkle_root.unwrap_or_else(|| "-".into()));
    println!("Leaves:       {}", tree.leaves().len());
    for (i, leaf) in tree.leaves().iter().enumerate() {
        let depth = tree
            .leaf_depth(leaf)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".into());
        println!(
            "  #{:<4} weight {:>3}  depth {:>2}  {}",
            i,
            leaf.weight,
            depth,
            leaf.required_keys
                .iter()
                .map(short_key)
                .collect::<Vec<_>>()
                .join(" + ")
        );
    }
    Ok(())
}

fn print_match(tree: &ScriptTree, signers: &[String], json_output: bool) -> Result<()> {
    anyhow::ensure!(!signers.is_empty(), "match needs at least one --signer");
    let signers = signers
        .iter()
        .map(|s| XOnlyPublicKey::from_str(s).with_context(|| format!("Invalid signer key: {}", s)))
        .collect::<Result<Vec<_>>>()?;

    let leaf = narrow_to_leaf(tree.leaves(), &signers).context("No unique leaf for signers")?;
    let control_block = tree.control_block(leaf)?;
    let miniscript = leaf.miniscript()?;
    log::info!("Matched leaf {}", leaf.leaf_hash());

    if json_output {
        let out = json!({
            "leaf_hash": leaf.leaf_hash().to_string(),
            "miniscript": miniscript.to_string(),
            "script": hex::encode(leaf.script.as_bytes()),
            "control_block": hex::encode(control_block.serialize()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Leaf hash:     {}", leaf.leaf_hash());
    println!("Miniscript:    {}", miniscript);
    println!("Script:        {}", hex::encode(leaf.script.as_bytes()));
    println!("Control block: {}", hex::encode(control_block.serialize()));
    Ok(())
}

fn short_key(key: &XOnlyPublicKey) -> String {
    let s = key.to_string();
    format!("{}…{}", &s[..8], &s[s.len() - 4..])
}

fn print_help() {
    println!(
        r#"tapquorum: k-of-n threshold Taproot script trees

USAGE:
    tapquorum [OPTIONS] <COMMAND>

COMMANDS:
    address               Print the output key, address and leaf layout
    match                 Find the leaf for a signer set (use --signer)

OPTIONS:
    -c, --config <PATH>   Config file path (default: tapquorum.toml)
    -s, --signer <HEX>    x-only key of a cooperating signer (repeatable)
    --json                Print machine-readable JSON
    --validate            Validate config file and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    TAPQUORUM_LOG_LEVEL   Log level (error/warn/info/debug/trace)
    TAPQUORUM_NETWORK     Bitcoin network (bitcoin/testnet/signet/regtest)
    TAPQUORUM_THRESHOLD   Number of signers required
    TAPQUORUM_STRATEGY    Leaf strategy (checksigadd/musig)

EXAMPLES:
    # Address for the configured policy
    tapquorum --config tapquorum.toml address

    # Leaf script and control block for two cooperating signers
    tapquorum --config tapquorum.toml match --signer <hex> --signer <hex>
"#
    );
}
