use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("waymark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extract page metadata from a domain's archived snapshots")
        .arg(clap::arg!(<DOMAINS> ... "Domains to look up (scheme and path are ignored)"))
        .arg(clap::arg!(-n --count <NUM> "Number of most recent snapshots per domain").default_value("10"))
        .arg(clap::arg!(--dedupe "Skip snapshots whose content is identical to the previous one"))
        .arg(clap::arg!(--classify "Label each page as clean or suspicious"))
        .arg(
            clap::Arg::new("api-key")
                .long("api-key")
                .value_name("KEY")
                .help("Credential for the remote classifier")
                .env("WAYMARK_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            clap::Arg::new("classifier-url")
                .long("classifier-url")
                .value_name("URL")
                .help("Base URL of an OpenAI-compatible chat completion API"),
        )
        .arg(
            clap::Arg::new("classifier-model")
                .long("classifier-model")
                .value_name("MODEL")
                .help("Model used by the remote classifier"),
        )
        .arg(
            clap::arg!(-f --format <FORMAT> "Output format (ndjson, json)")
                .value_name("FORMAT")
                .default_value("ndjson")
                .value_parser(["ndjson", "jsonl", "json"]),
        )
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--concurrency <NUM> "Snapshots fetched at once per domain").default_value("0"))
        .arg(
            clap::Arg::new("delay-ms")
                .long("delay-ms")
                .value_name("MS")
                .help("Pause between snapshot fetches in sequential mode")
                .default_value("150"),
        )
        .arg(clap::arg!(--parallel <NUM> "Domains processed at once").default_value("4"))
        .arg(
            clap::Arg::new("index-url")
                .long("index-url")
                .value_name("URL")
                .help("Archive index endpoint"),
        )
        .arg(
            clap::Arg::new("archive-base")
                .long("archive-base")
                .value_name("URL")
                .help("Base URL archived documents are fetched from"),
        )
        .arg(clap::arg!(--remote <URL> "Read the progress stream of a running waymark server"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "waymark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "waymark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "waymark", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "waymark", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
