use std::fs;
use std::io::{self, Read};
use std::process;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use hl7_mllp_sender::cli::{Cli, Command, GenerateArgs, ListenArgs, RunArgs, SendArgs};
use hl7_mllp_sender::message::normalize_segment_breaks;
use hl7_mllp_sender::{builtin, runner, Dataset, Error, Listener, Result, Runner, Session, Transport, TransportConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level when both are given
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if let Err(e) = dispatch(cli.command).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Send(args) => send(args).await,
        Command::Run(args) => run(args).await,
        Command::Generate(args) => generate(args),
        Command::Listen(args) => listen(args).await,
        Command::Templates => {
            for name in builtin::names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn send(args: SendArgs) -> Result<()> {
    let text = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    // files are usually saved with one segment per line
    let payload = normalize_segment_breaks(text.trim_end());

    let limit = match args.network.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let config = TransportConfig::default()
        .with_timeout(limit)
        .with_response_byte_limit(args.network.response_limit);

    let results = Transport::new(config).send(&payload, &args.targets).await?;
    runner::report(&results);
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let mut runner = Runner::new(args.scenario()?)?;
    runner.run().await?;
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    let template = builtin::resolve(&args.template)?;
    let session = match args.seed {
        Some(seed) => Session::seeded(seed),
        None => Session::new(),
    };
    let mut session = match &args.dataset {
        Some(path) => session.with_dataset(Dataset::from_path(path)?),
        None => session,
    };

    for _ in 0..args.count {
        let payload = session.generate(&template)?.render();
        match &args.output_dir {
            Some(dir) => {
                let path = runner::save_message(dir, &payload, session.sequence(), None, args.format)?;
                info!("Saved {}", path.display());
            }
            None => println!("{}\n", payload.replace('\r', "\n")),
        }
    }
    Ok(())
}

async fn listen(args: ListenArgs) -> Result<()> {
    let mut listener = Listener::bind(args.bind.as_str()).await?;
    if let Some(ack) = args.ack {
        listener = listener.with_ack(Bytes::from(ack));
    }
    listener.run().await.map_err(Error::from)
}
