use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

use tfdiagram::compose::combine;
use tfdiagram::document::load_diagram;
use tfdiagram::{
    DisplayOptions, FeedbackSign, Interconnection, RationalAlgebra, Reduction, TransferAlgebra,
    parse_expression, reduce,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reduce control block diagrams to transfer functions", long_about = None)]
struct Cli {
    /// Round printed coefficients to this many decimal places
    #[arg(long, global = true, value_name = "N")]
    precision: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reduce a diagram file (.json, or binary) and print every input -> output transfer function
    Reduce {
        #[arg(value_name = "DIAGRAM_FILE")]
        file: Utf8PathBuf,
        /// Print numerator over denominator on separate lines
        #[arg(long)]
        pretty: bool,
    },
    /// Combine two transfer-function expressions
    Combine {
        #[arg(value_enum)]
        how: Mode,
        g1: String,
        g2: String,
        /// Positive instead of negative feedback
        #[arg(long)]
        positive: bool,
    },
    /// Parse an expression and print its normalized form
    Parse {
        #[arg(value_name = "EXPR")]
        expr: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Series,
    Parallel,
    Feedback,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let display = DisplayOptions::default().with_precision(cli.precision);
    let alg = RationalAlgebra::new().with_display(display);

    match cli.command {
        Command::Reduce { file, pretty } => run_reduce(&alg, &file, pretty),
        Command::Combine {
            how,
            g1,
            g2,
            positive,
        } => {
            let how = match how {
                Mode::Series => Interconnection::Series,
                Mode::Parallel => Interconnection::Parallel,
                Mode::Feedback if positive => Interconnection::Feedback(FeedbackSign::Positive),
                Mode::Feedback => Interconnection::Feedback(FeedbackSign::Negative),
            };
            let g1 = parse_expression(&g1).context("Invalid G1")?;
            let g2 = parse_expression(&g2).context("Invalid G2")?;
            let out = combine(&alg, how, &g1, &g2)?;
            println!("{}", alg.to_display_string(&out));
            Ok(())
        }
        Command::Parse { expr } => {
            let tf = parse_expression(&expr)?;
            println!("{}", alg.to_display_string(&tf));
            Ok(())
        }
    }
}

fn run_reduce(alg: &RationalAlgebra, file: &Utf8PathBuf, pretty: bool) -> Result<()> {
    let diagram = load_diagram(file)?;
    let reduction = reduce(&diagram, alg).with_context(|| format!("Failed to reduce {}", file))?;
    let map = match reduction {
        Reduction::Reduced(map) => map,
        Reduction::NoInputOutput {
            has_inputs,
            ..
        } => {
            log::warn!(
                "{} has no {} block; nothing to reduce",
                file,
                if has_inputs { "output" } else { "input" }
            );
            return Ok(());
        }
    };

    for (sink, outcome) in &map {
        let sink_name = block_name(&diagram, *sink);
        let sources = match outcome {
            Ok(sources) => sources,
            Err(err) => {
                log::warn!("{}: {}", sink_name, err);
                continue;
            }
        };
        for (source, tf) in sources {
            let source_name = block_name(&diagram, *source);
            if pretty {
                println!("{} -> {}:", source_name, sink_name);
                println!("{}", tf.to_pretty_string(alg.display()));
                println!();
            } else {
                println!("{} -> {}: {}", source_name, sink_name, alg.to_display_string(tf));
            }
        }
    }
    Ok(())
}

fn block_name(diagram: &tfdiagram::Diagram, id: tfdiagram::BlockId) -> String {
    diagram
        .block(id)
        .map_or_else(|| id.to_string(), |b| b.name.clone())
}
