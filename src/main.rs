use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use pagesmith::{ClientConfig, ConvertClient};

/// Upload a webpage image to a generation service and print the markup.
#[derive(Parser, Debug)]
#[command(name = "pagesmith", version, about)]
struct Args {
    /// Path to the webpage image (png/jpg/jpeg)
    image: PathBuf,

    /// Base URL of the generation service
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Watch generation happen live (progress on stderr)
    #[arg(long)]
    stream: bool,

    /// Use the service's heuristic description pass
    #[arg(long)]
    heuristic: bool,

    /// Write the generated markup here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Artificial delay between displayed lines in milliseconds (max 50)
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let image = std::fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let filename = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());

    let config = ClientConfig {
        base_url: args.url.clone(),
        use_heuristic: args.heuristic,
        line_delay_ms: args.delay_ms,
        ..Default::default()
    };
    let mut client = ConvertClient::new(config)?;

    let markup = if args.stream {
        client.on_event(|event| eprintln!("[{}] {}", event.phase, event.message));
        client.on_terminal(|_| eprintln!("[finalizing] stream finished"));

        let outcome = client.convert_stream(image, &filename).await?;
        outcome.markup().to_string()
    } else {
        let conversion = client.convert(image, &filename).await?;
        if let Some(request_id) = &conversion.request_id {
            eprintln!("request id: {request_id}");
        }
        pagesmith::extract_markup(&conversion.code).to_string()
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &markup)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(markup.as_bytes())?;
            if !markup.ends_with('\n') {
                writeln!(stdout)?;
            }
        }
    }

    Ok(())
}
