//! Terminal front end for charloom
//!
//! One-shot mode generates from the prompt argument and exits. Interactive
//! mode reads one prompt per line from stdin; a new line supersedes the
//! generation still running for the previous one.

use std::io::{Stdout, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use charloom_engine::{
    GenerationRequest, Generator, Outcome, OutputSink, RequestId, SamplingConfig, Settings,
    Temperature, load_generator,
};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Character-level text generation with a pretrained recurrent model
#[derive(Parser, Debug)]
#[command(name = "charloom")]
#[command(about = "Generate text one character at a time from a seed prompt", long_about = None)]
struct Cli {
    /// Seed prompt (required unless --interactive)
    prompt: Option<String>,

    /// Number of characters to generate
    #[arg(short, long, allow_negative_numbers = true)]
    num_chars: Option<i64>,

    /// Softmax temperature (>1 flatter, <1 sharper)
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Sampler seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// ONNX model file (overrides config)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Vocabulary JSON file (overrides config)
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Settings file merged on top of the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read prompts from stdin, one per line
    #[arg(short, long)]
    interactive: bool,

    /// Write the effective settings as TOML and exit (default: the user config file)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    write_config: Option<Option<PathBuf>>,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Settings::load()?,
        };
        if let Some(model) = &self.model {
            settings.model.path = model.clone();
        }
        if let Some(vocab) = &self.vocab {
            settings.model.vocab = vocab.clone();
        }
        if let Some(t) = self.temperature {
            settings.generation.temperature = t;
        }
        if self.seed.is_some() {
            settings.generation.seed = self.seed;
        }
        Ok(settings)
    }

    fn request(&self, prompt: &str, settings: &Settings) -> Result<GenerationRequest, String> {
        let num_chars = self
            .num_chars
            .unwrap_or(settings.generation.num_chars as i64);
        let sampling = SamplingConfig {
            temperature: Temperature::or_default(Some(settings.generation.temperature)),
            seed: settings.generation.seed,
        };
        GenerationRequest::new(prompt, num_chars, sampling).map_err(|e| e.to_string())
    }
}

/// Terminal shared by every session. Only the owner may write to it.
struct Terminal<W> {
    owner: RequestId,
    /// The owner printed text that has not been ended with a newline yet
    line_open: bool,
    out: W,
}

type SharedTerminal<W> = Arc<Mutex<Terminal<W>>>;

impl<W: Write> Terminal<W> {
    fn new(out: W) -> Self {
        Self {
            owner: 0,
            line_open: false,
            out,
        }
    }

    /// Hand the terminal to `request_id`, closing the previous owner's line.
    fn claim(&mut self, request_id: RequestId) {
        self.end_line();
        self.owner = request_id;
    }

    fn write_for(&mut self, request_id: RequestId, text: &str) {
        if self.owner != request_id || text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_open = true;
    }

    fn end_line(&mut self) {
        if self.line_open {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.line_open = false;
        }
    }
}

/// Writes only the part of the accumulated text not yet printed.
struct TerminalSink<W> {
    request_id: RequestId,
    printed: usize,
    terminal: SharedTerminal<W>,
}

impl<W: Write + Send> OutputSink for TerminalSink<W> {
    fn publish(&mut self, text: &str) {
        let mut terminal = self.terminal.lock().expect("lock poisoned");
        if let Some(fresh) = text.get(self.printed..) {
            terminal.write_for(self.request_id, fresh);
        }
        self.printed = text.len();
    }
}

/// Print the end of a session. Superseded sessions stay silent.
fn report<W: Write>(terminal: &SharedTerminal<W>, request_id: RequestId, outcome: &Outcome) {
    let mut terminal = terminal.lock().expect("lock poisoned");
    if terminal.owner == request_id {
        terminal.end_line();
    }
    if let Outcome::Failed { error, .. } = outcome {
        eprintln!("Generation failed: {}", error);
    }
}

fn spawn_session<W: Write + Send + 'static>(
    generator: &Generator,
    request: GenerationRequest,
    terminal: &SharedTerminal<W>,
) -> JoinHandle<()> {
    let session = generator.start(request);
    let request_id = session.id();
    terminal.lock().expect("lock poisoned").claim(request_id);

    let terminal = Arc::clone(terminal);
    let mut sink = TerminalSink {
        request_id,
        printed: 0,
        terminal: Arc::clone(&terminal),
    };
    // Echo the prompt before the generated characters
    sink.publish(session.request().prompt());
    tokio::spawn(async move {
        let outcome = session.run(&mut sink).await;
        report(&terminal, request_id, &outcome);
    })
}

async fn run_interactive(
    cli: &Cli,
    settings: &Settings,
    generator: &Generator,
    terminal: &SharedTerminal<Stdout>,
) -> Result<()> {
    eprintln!(
        "Enter a prompt and press Enter. A new prompt replaces the running one. Ctrl-D quits."
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut running: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let request = match cli.request(&line, settings) {
            Ok(request) => request,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };
        running = Some(spawn_session(generator, request, terminal));
    }

    if let Some(task) = running {
        task.await.context("generation task panicked")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is the display surface
    let default_filter = if cli.verbose {
        "charloom=debug,charloom_engine=debug"
    } else {
        "charloom=warn,charloom_engine=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = cli.settings()?;

    if let Some(target) = &cli.write_config {
        let path = match target {
            Some(path) => path.clone(),
            None => Settings::config_file().context("could not determine config directory")?,
        };
        settings.write_to(&path)?;
        eprintln!("Wrote settings to {}", path.display());
        return Ok(());
    }

    let terminal = Arc::new(Mutex::new(Terminal::new(std::io::stdout())));

    if cli.interactive {
        let generator = load_generator(&settings).context("failed to load model")?;
        return run_interactive(&cli, &settings, &generator, &terminal).await;
    }

    let Some(prompt) = cli.prompt.as_deref() else {
        anyhow::bail!("a prompt is required (or pass --interactive)");
    };
    // Reject bad input before paying for model loading
    let request = match cli.request(prompt, &settings) {
        Ok(request) => request,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(2);
        }
    };

    let generator = load_generator(&settings).context("failed to load model")?;
    spawn_session(&generator, request, &terminal)
        .await
        .context("generation task panicked")?;
    Ok(())
}
