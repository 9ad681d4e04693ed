use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command};
use serde_json::json;

use target_azure::config::{TargetConfig, DEFAULT_MAX_BUFFER_SIZE, ENV_PREFIX};
use target_azure::sink::naming::DEFAULT_FILE_NAME_TEMPLATE;
use target_azure::storage::AzureBlobStore;
use target_azure::target::Target;
use target_azure::Error;

fn about() -> serde_json::Value {
    json!({
        "name": "target-azure",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "capabilities": ["about"],
        "env_prefix": ENV_PREFIX,
        "settings": {
            "storage_account_name": { "type": "string", "required": true },
            "storage_account_key": { "type": "string", "required": true, "secret": true },
            "container_name": { "type": "string", "required": true },
            "root_folder": { "type": "string", "default": "" },
            "file_name_template": {
                "type": "string",
                "default": DEFAULT_FILE_NAME_TEMPLATE,
                "tokens": ["{stream}", "{timestamp}", "{date}", "{time}"]
            },
            "max_buffer_size": { "type": "integer", "default": DEFAULT_MAX_BUFFER_SIZE },
            "sanitize_file_names": { "type": "boolean", "default": false },
            "storage_endpoint": { "type": "string" }
        }
    })
}

fn run(args: &ArgMatches) -> Result<(), Error> {
    let config = TargetConfig::load(args.value_of("config").map(Path::new))?;

    let store = AzureBlobStore::new(
        &config.storage_account_name,
        config.account_key(),
        config.storage_endpoint.as_deref(),
    )
    .map_err(|err| Error::Config(format!("can't set up storage client: {err}")))?;

    let input: Box<dyn BufRead> = match args.value_of("input") {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    let summary = Target::new(config, Arc::new(store)).run(input, io::stdout().lock())?;

    log::debug!("{:?}", summary);

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Command::new("target-azure")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help("JSON, TOML or YAML settings file; TARGET_AZURE_* env vars override it"),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .takes_value(true)
                .value_name("FILE")
                .help("read messages from a file instead of stdin"),
        )
        .arg(
            Arg::new("about")
                .long("about")
                .help("print connector metadata and exit"),
        )
        .get_matches();

    if args.is_present("about") {
        println!("{:#}", about());
        return;
    }

    if let Err(err) = run(&args) {
        log::error!("{}", err);
        process::exit(1);
    }
}
