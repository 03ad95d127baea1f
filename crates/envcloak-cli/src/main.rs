//! envcloak - encrypt secrets and .env files with a fido2 token
//!
//! usage:
//!   envcloak keygen --keyfile envcloak.key          # key from token / fallback
//!   envcloak encrypt .env --keyfile envcloak.key    # writes .env.enc
//!   envcloak get DATABASE_URL --file .env.enc --keyfile envcloak.key
//!   envcloak list .env.enc --keyfile envcloak.key   # names, masked values
//!   envcloak hash --algorithm memory_hard
//!   envcloak random 6 --source bounded_uniform
//!
//! files are read and written in place with no locking; do not point two
//! envcloak processes at the same file.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use envcloak::envfile::parse_env;
use envcloak::{
    audit, token, ConfigResolver, EncryptedBlob, HashAlgorithm, KeyDeriver, KeyMaterial,
    KeySource, Prompt, RandomSource, RandomnessProvider, SecretDigest, SecretHasher, Settings,
    SymmetricCipher, TokenProvider,
};
use tracing::{info, warn};

/// envcloak - encrypt secrets and .env files with a fido2 token
#[derive(Parser)]
#[command(name = "envcloak")]
#[command(about = "envcloak - encrypt secrets and .env files with a fido2 token")]
#[command(version)]
struct Args {
    /// settings file (json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// print secret values instead of masking them
    #[arg(long, global = true)]
    show_secrets: bool,

    /// debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ignore connected tokens, always use fallback mode
    #[arg(long, global = true)]
    no_token: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// derive a key and store it in a keyfile
    Keygen {
        #[arg(short, long)]
        keyfile: PathBuf,
        /// stretch the token id with scrypt (reproducible with the printed salt)
        #[arg(long)]
        stretch: bool,
        /// replace an existing keyfile
        #[arg(long)]
        force: bool,
    },
    /// encrypt a file, in place or into --output
    Encrypt {
        file: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
        /// destination, default: <file>.<encrypted extension>
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// overwrite the file itself
        #[arg(long, conflicts_with = "output")]
        in_place: bool,
    },
    /// decrypt a file to stdout, or in place
    Decrypt {
        file: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        in_place: bool,
        /// reject tokens older than this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// resolve one variable from env, encrypted file, plaintext file or prompt
    Get {
        name: String,
        #[arg(short, long, default_value = ".env.enc")]
        file: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
        /// ask on the terminal when nothing else has the value
        #[arg(long)]
        prompt: bool,
        /// skip process environment overrides
        #[arg(long)]
        no_env: bool,
    },
    /// print every entry of an env file, decrypting `.enc` files in memory
    List {
        file: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// hash a secret read from stdin
    Hash {
        #[arg(short, long, default_value = "memory_hard")]
        algorithm: String,
    },
    /// check a secret read from stdin against a stored digest
    Verify { digest: String },
    /// sample a random integer
    Random {
        /// bytes (os_csprng), digits (bounded_uniform) or bits/4 (bit_count_uniform)
        length: usize,
        #[arg(short, long, default_value = "os_csprng")]
        source: String,
    },
    /// shannon entropy of a file
    Entropy { file: PathBuf },
    /// list connected fido2 tokens
    Devices,
}

#[derive(clap::Args)]
struct KeyArgs {
    /// keyfile holding the 44 char key
    #[arg(short, long)]
    keyfile: Option<PathBuf>,
    /// hex salt from `keygen --stretch`, derives the key from the token
    #[arg(long, conflicts_with = "keyfile")]
    salt: Option<String>,
}

struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&self, name: &str) -> Option<String> {
        eprint!("{}: ", name);
        std::io::stderr().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        let value = line.trim_end_matches(['\r', '\n']).to_string();
        (!value.is_empty()).then_some(value)
    }
}

fn main() {
    let args = Args::parse();
    let settings = load_settings(&args);

    // an unreadable --config still gets logged, at the flag's level
    let show_debug = settings.as_ref().map(|s| s.show_debug).unwrap_or(args.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(show_debug))),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = settings.and_then(|settings| run(args, settings)) {
        tracing::error!("{:#}", e);
        // 2: missing input or failed decrypt, 1: anything else
        let recoverable = e
            .downcast_ref::<envcloak::Error>()
            .map(envcloak::Error::is_recoverable)
            .unwrap_or(false);
        std::process::exit(if recoverable { 2 } else { 1 });
    }
}

fn default_filter(show_debug: bool) -> &'static str {
    if show_debug {
        "envcloak=debug"
    } else {
        "envcloak=info"
    }
}

fn run(args: Args, settings: Settings) -> Result<()> {
    let provider: Box<dyn TokenProvider> = if args.no_token {
        Box::new(envcloak::NoTokenProvider)
    } else {
        token::default_provider()
    };

    match args.command {
        Command::Keygen { keyfile, stretch, force } => {
            keygen(provider, &settings, &keyfile, stretch, force)
        }
        Command::Encrypt { file, key, output, in_place } => {
            let key = load_key(&key, provider, &settings)?;
            let cipher = SymmetricCipher::new(&key);
            if in_place {
                cipher.encrypt_file(&file)?;
                info!("encrypted {} in place", file.display());
            } else {
                let output = output.unwrap_or_else(|| {
                    let mut name = file.clone().into_os_string();
                    name.push(format!(".{}", settings.encrypted_extension));
                    PathBuf::from(name)
                });
                cipher.encrypt_file_to(&file, &output)?;
                info!("encrypted {} -> {}", file.display(), output.display());
            }
            Ok(())
        }
        Command::Decrypt { file, key, in_place, ttl } => {
            let key = load_key(&key, provider, &settings)?;
            let cipher = SymmetricCipher::new(&key);
            let plaintext = match (in_place, ttl) {
                (true, None) => {
                    cipher.decrypt_file_in_place(&file)?;
                    info!("decrypted {} in place", file.display());
                    return Ok(());
                }
                (true, Some(_)) => bail!("--ttl cannot be combined with --in-place"),
                (false, Some(ttl)) => {
                    cipher.decrypt_with_ttl(
                        &EncryptedBlob::read_file(&file)?,
                        std::time::Duration::from_secs(ttl),
                    )?
                }
                (false, None) => cipher.decrypt_file(&file)?,
            };
            std::io::stdout().write_all(&plaintext)?;
            Ok(())
        }
        Command::Get { name, file, key, prompt, no_env } => {
            let source = key_source(&key)?;
            let mut resolver =
                ConfigResolver::new(provider, source, settings.clone()).with_env_override(!no_env);
            if prompt {
                resolver = resolver.with_prompt(Box::new(TerminalPrompt));
            }
            match resolver.resolve_detailed(&file, &name) {
                Some((value, from)) => {
                    info!("{} resolved from {:?}", name, from);
                    println!("{}", settings.display_secret(&value));
                    Ok(())
                }
                None => Err(envcloak::Error::NotFound(name).into()),
            }
        }
        Command::List { file, key } => {
            let encrypted = file
                .extension()
                .map(|ext| ext == settings.encrypted_extension.as_str())
                .unwrap_or(false);
            let content = if encrypted {
                let key = load_key(&key, provider, &settings)?;
                let plaintext = SymmetricCipher::new(&key).decrypt_file(&file)?;
                String::from_utf8(plaintext)
                    .with_context(|| format!("{} is not utf-8 after decrypting", file.display()))?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?
            };
            for line in list_entries(&content, &settings) {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Hash { algorithm } => {
            let algorithm: HashAlgorithm = algorithm.parse()?;
            if !algorithm.suitable_for_secrets() {
                warn!("{} is not suitable for storing secrets", algorithm);
            }
            let secret = read_secret()?;
            let digest = SecretHasher::new(&settings)?.hash(&secret, algorithm)?;
            println!("{}", digest);
            Ok(())
        }
        Command::Verify { digest } => {
            let digest = SecretDigest::parse(&digest)?;
            let secret = read_secret()?;
            if SecretHasher::new(&settings)?.verify(&digest, &secret) {
                println!("ok ({})", digest.algorithm);
                Ok(())
            } else {
                bail!("secret does not match {} digest", digest.algorithm)
            }
        }
        Command::Random { length, source } => {
            let source: RandomSource = source.parse()?;
            let value = RandomnessProvider::new().sample(length, source)?;
            println!("{}", value);
            Ok(())
        }
        Command::Entropy { file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let report = audit(&data);
            println!(
                "{}: {:.4} bits/byte over {} bytes, {} distinct ({})",
                file.display(),
                report.entropy,
                report.len,
                report.distinct,
                report.verdict
            );
            Ok(())
        }
        Command::Devices => {
            let devices = provider.list_devices()?;
            if devices.is_empty() {
                warn!("no fido2 tokens found via {}", provider.name());
            }
            for (i, device) in devices.iter().enumerate() {
                let id = device
                    .device_number()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| "?".into());
                println!("{} {} (id {}){}", i, device, id, if i == 0 { " [active]" } else { "" });
            }
            Ok(())
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let show_secrets = args.show_secrets || settings.show_secrets;
    let show_debug = args.verbose || settings.show_debug;
    Ok(settings.with_show_secrets(show_secrets).with_show_debug(show_debug))
}

/// `KEY=value` lines in file order, values masked unless `show_secrets`
fn list_entries(content: &str, settings: &Settings) -> Vec<String> {
    parse_env(content)
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, settings.display_secret(&value)))
        .collect()
}

fn keygen(
    provider: Box<dyn TokenProvider>,
    settings: &Settings,
    keyfile: &Path,
    stretch: bool,
    force: bool,
) -> Result<()> {
    if keyfile.exists() && !force {
        bail!("{} exists, pass --force to replace it", keyfile.display());
    }
    let derived = KeyDeriver::new(provider, settings).derive_from_token(stretch)?;

    let report = audit(derived.key.as_bytes());
    info!("key entropy {:.3} bits/byte", report.entropy);
    if !derived.is_hardware_backed() {
        warn!("no token connected: fallback key is tied to this machine and user only");
    } else if !derived.is_reproducible() {
        warn!("random key: losing {} means losing the data", keyfile.display());
    }

    derived.key.write_keyfile(keyfile)?;
    info!("wrote {}", keyfile.display());
    if let Some(salt) = derived.salt() {
        println!("salt: {}", hex::encode(salt));
    }
    Ok(())
}

fn key_source(args: &KeyArgs) -> Result<KeySource> {
    match (&args.keyfile, &args.salt) {
        (Some(keyfile), _) => Ok(KeySource::Keyfile(keyfile.clone())),
        (None, Some(salt)) => Ok(KeySource::TokenSalt(parse_salt(salt)?)),
        (None, None) => bail!("pass --keyfile or --salt"),
    }
}

/// key for encrypt/decrypt: keyfile, token + salt, or the fallback key
fn load_key(
    args: &KeyArgs,
    provider: Box<dyn TokenProvider>,
    settings: &Settings,
) -> Result<KeyMaterial> {
    let deriver = KeyDeriver::new(provider, settings);
    if let Some(keyfile) = &args.keyfile {
        return Ok(KeyMaterial::read_keyfile(keyfile)?);
    }
    if let Some(salt) = &args.salt {
        return Ok(deriver.derive_with_salt(&parse_salt(salt)?)?.key);
    }
    warn!("no --keyfile or --salt given, using the machine fallback key");
    Ok(deriver.fallback_key())
}

fn parse_salt(salt: &str) -> Result<[u8; envcloak::kdf::SALT_LEN]> {
    let bytes = hex::decode(salt.trim()).context("salt must be hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("salt must be {} bytes", envcloak::kdf::SALT_LEN))
}

fn read_secret() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).context("reading secret from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("empty secret on stdin");
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_salt() {
        let salt = parse_salt("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(salt[15], 0x0f);
        assert!(parse_salt("abcd").is_err());
        assert!(parse_salt("zz").is_err());
    }

    #[test]
    fn test_key_source_requires_one() {
        let none = KeyArgs { keyfile: None, salt: None };
        assert!(key_source(&none).is_err());
        let keyfile = KeyArgs { keyfile: Some("k".into()), salt: None };
        assert!(matches!(key_source(&keyfile).unwrap(), KeySource::Keyfile(_)));
    }

    #[test]
    fn test_load_key_falls_back_without_args() {
        let settings = Settings::default().fast_kdf();
        let none = KeyArgs { keyfile: None, salt: None };
        let a = load_key(&none, Box::new(envcloak::NoTokenProvider), &settings).unwrap();
        let b = load_key(&none, Box::new(envcloak::NoTokenProvider), &settings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_show_debug_selects_filter() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("envcloak.json");
        std::fs::write(&config, r#"{"show_debug": true}"#).unwrap();

        let args = Args::try_parse_from([
            "envcloak",
            "--config",
            config.to_str().unwrap(),
            "devices",
        ])
        .unwrap();
        let settings = load_settings(&args).unwrap();
        assert!(settings.show_debug);
        assert_eq!(default_filter(settings.show_debug), "envcloak=debug");

        let quiet = Args::try_parse_from(["envcloak", "devices"]).unwrap();
        assert_eq!(default_filter(load_settings(&quiet).unwrap().show_debug), "envcloak=info");
        let verbose = Args::try_parse_from(["envcloak", "-v", "devices"]).unwrap();
        assert_eq!(default_filter(load_settings(&verbose).unwrap().show_debug), "envcloak=debug");
    }

    #[test]
    fn test_list_entries_masks_values() {
        let content = "# db\nDB_PASSWORD=hunter2-long-secret\nexport REGION=eu\n";
        let masked = list_entries(content, &Settings::default());
        assert_eq!(masked.len(), 2);
        assert!(masked[0].starts_with("DB_PASSWORD="));
        assert!(!masked[0].contains("hunter2-long-secret"));
        assert!(masked[1].starts_with("REGION="));

        let shown = list_entries(content, &Settings::default().with_show_secrets(true));
        assert_eq!(shown, vec!["DB_PASSWORD=hunter2-long-secret", "REGION=eu"]);
    }

    #[test]
    fn test_keygen_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("k.key");
        std::fs::write(&keyfile, "existing").unwrap();
        let settings = Settings::default().fast_kdf();

        let result = keygen(Box::new(envcloak::NoTokenProvider), &settings, &keyfile, false, false);
        assert!(result.is_err());
        keygen(Box::new(envcloak::NoTokenProvider), &settings, &keyfile, false, true).unwrap();
        assert!(KeyMaterial::read_keyfile(&keyfile).is_ok());
    }
}
