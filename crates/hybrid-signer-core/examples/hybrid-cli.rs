//! Hybrid Signer CLI Example
//!
//! This example drives a secure element holding a hybrid secp256k1 +
//! post-quantum key over the native PC/SC transport on macOS, Linux, and
//! Windows.
//!
//! # Prerequisites
//!
//! - A secure element exposed as a smart-card reader and running the hybrid
//!   signing applet
//! - PC/SC daemon running (built-in on macOS/Windows, `pcscd` on Linux)
//!
//! # Quick Start
//!
//! ```bash
//! cargo run --example hybrid-cli -p hybrid-signer-core --features pcsc -- list
//! cargo run --example hybrid-cli -p hybrid-signer-core --features pcsc -- address
//! cargo run --example hybrid-cli -p hybrid-signer-core --features pcsc -- sign-op ml-dsa-44 clear
//! ```
//!
//! Set `RUST_LOG=hybrid_signer_core=trace` to see every APDU.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list` | List available readers |
//! | `address [path]` | Show the classical address |
//! | `pq-key <alg> [path]` | Generate and export the post-quantum public key |
//! | `sign <hash> [path]` | Sign a 32-byte hash with the classical key |
//! | `sign-op <alg> [hybrid\|clear]` | Hybrid-sign a sample user operation |
//!
//! `<alg>` is `ml-dsa-44` or `falcon-512`; `[path]` defaults to
//! `m/44'/60'/0'/0/0`.

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;

use alloy_primitives::{U256, address};
use hybrid_signer_core::config::ENTRY_POINT_V07;
use hybrid_signer_core::device::{
    self, DerivationPath, DeviceHybridSigner, DeviceSession, PcscTransport, SharedSession,
    SigningMode,
};
use hybrid_signer_core::operation::pack_u128_pair;
use hybrid_signer_core::signer::OperationSigner;
use hybrid_signer_core::{B256, PackedUserOperation, PqAlgorithm, Result, operation_hash};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return;
    }

    let result = match args[1].as_str() {
        "list" => cmd_list(),
        "address" => cmd_address(&args[2..]),
        "pq-key" => cmd_pq_key(&args[2..]),
        "sign" => cmd_sign(&args[2..]),
        "sign-op" => cmd_sign_op(&args[2..]),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            Ok(())
        }
    };

    if let Err(e) = result {
        if e.is_user_rejection() {
            eprintln!("Rejected on the device.");
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}

fn print_help() {
    println!(
        r"Hybrid Signer CLI

USAGE:
    hybrid-cli <COMMAND>

COMMANDS:
    list                          List available readers
    address [path]                Show the classical address
    pq-key <alg> [path]           Generate and export the post-quantum public key
    sign <hash> [path]            Sign a 32-byte hash with the classical key
    sign-op <alg> [hybrid|clear]  Hybrid-sign a sample user operation
    help                          Show this help message

ALGORITHMS:
    ml-dsa-44, falcon-512
"
    );
}

fn connect() -> Result<SharedSession> {
    let transport = PcscTransport::connect(None)?;
    println!("Using reader: {}\n", transport.reader());
    Ok(device::share(DeviceSession::new(Box::new(transport))))
}

fn parse_path(args: &[String], index: usize) -> Result<DerivationPath> {
    args.get(index)
        .map_or_else(|| Ok(DerivationPath::default()), |s| s.parse())
}

fn parse_algorithm(arg: Option<&String>) -> Result<PqAlgorithm> {
    let arg = arg.map_or("ml-dsa-44", String::as_str);
    serde_json::from_value(serde_json::Value::String(arg.to_string()))
        .map_err(|_| hybrid_signer_core::Error::Validation(format!("unknown algorithm {arg}")))
}

fn cmd_list() -> Result<()> {
    let readers = PcscTransport::list_readers()?;
    if readers.is_empty() {
        println!("No readers found.");
        println!("\nMake sure:");
        println!("  - The device is plugged in");
        println!("  - The PC/SC daemon is running");
    } else {
        println!("Found {} reader(s):\n", readers.len());
        for (i, reader) in readers.iter().enumerate() {
            println!("  [{}] {reader}", i + 1);
        }
    }
    Ok(())
}

fn cmd_address(args: &[String]) -> Result<()> {
    let path = parse_path(args, 0)?;
    let session = connect()?;
    let mut guard = session
        .lock()
        .map_err(|_| hybrid_signer_core::Error::ChannelFailed("lock poisoned".to_string()))?;

    let public_key = guard.get_public_key(&path)?;
    let address = guard.get_address(&path)?;
    println!("Path: {path}");
    println!("Public Key (uncompressed):");
    println!("  0x{}", hex::encode(public_key));
    println!();
    println!("Ethereum Address:");
    println!("  {address}");
    Ok(())
}

fn cmd_pq_key(args: &[String]) -> Result<()> {
    let algorithm = parse_algorithm(args.first())?;
    let path = parse_path(args, 1)?;
    let session = connect()?;

    println!("Generating {algorithm} key for {path}...");
    let signer = device::DevicePostQuantumSigner::new(session, path, algorithm)?;
    let public_key = hybrid_signer_core::signer::PostQuantumSigner::public_key(&signer);
    let encoded = hybrid_signer_core::signer::PostQuantumSigner::encoded_public_key(&signer)?;

    println!();
    println!("Public Key ({} bytes):", public_key.len());
    println!("  0x{}", hex::encode(public_key));
    println!();
    println!("Verifier Encoding ({} bytes):", encoded.len());
    println!("  0x{}", hex::encode(encoded));
    Ok(())
}

fn cmd_sign(args: &[String]) -> Result<()> {
    let Some(hash_hex) = args.first() else {
        eprintln!("Usage: sign <32-byte-hash-hex> [path]");
        return Ok(());
    };
    let hash = B256::from(hybrid_signer_core::codec::decode_hex_array::<32>(hash_hex)?);
    let path = parse_path(args, 1)?;
    let session = connect()?;

    println!("Signing hash: {hash}");
    println!("Confirm on the device...");
    let signer = device::DeviceClassicalSigner::new(session, path)?;
    let signature = hybrid_signer_core::signer::ClassicalSigner::sign_hash(&signer, &hash)?;

    println!();
    println!("Signature:");
    println!("  r: 0x{}", hex::encode(signature.r()));
    println!("  s: 0x{}", hex::encode(signature.s()));
    println!("  v: {}", signature.v());
    println!();
    println!("Full Signature (65 bytes):");
    println!("  {}", signature.to_hex());
    Ok(())
}

fn cmd_sign_op(args: &[String]) -> Result<()> {
    let algorithm = parse_algorithm(args.first())?;
    let mode = match args.get(1).map(String::as_str) {
        Some("clear") => SigningMode::ClearSign,
        _ => SigningMode::HybridSign,
    };
    let session = connect()?;
    let signer = DeviceHybridSigner::new(session, DerivationPath::default(), algorithm, mode)?;

    let op = PackedUserOperation {
        sender: address!("0x1234567890123456789012345678901234567890"),
        nonce: U256::ZERO,
        account_gas_limits: pack_u128_pair(8_000_000, 500_000),
        pre_verification_gas: U256::from(400_000),
        gas_fees: pack_u128_pair(2_000_000_000, 50_000_000_000),
        ..PackedUserOperation::default()
    };
    let chain_id = 11_155_111;

    println!("Signer: {}", signer.address());
    println!("Operation Hash: {}", operation_hash(&op, ENTRY_POINT_V07, chain_id));
    println!("Confirm on the device...");

    let signature = signer.sign_operation(&op, ENTRY_POINT_V07, chain_id)?;
    let encoded = signature.encode();

    println!();
    println!("Classical Signature:");
    println!("  0x{}", hex::encode(signature.classical()));
    println!();
    println!("Hybrid Signature ({} bytes):", encoded.len());
    println!("  {encoded}");
    Ok(())
}
