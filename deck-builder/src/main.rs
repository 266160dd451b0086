use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tysm::chat_completions::ChatClient;

use deck_builder::baseform::BaseformOverrides;
use deck_builder::checkpoint::DiskCheckpoint;
use deck_builder::lemmatize::ParseCache;
use deck_builder::partition::{PartitionOutcome, Partitioner};
use deck_builder::{Config, Deck, DeckError, generation, import, nlp, split};

/// Build a sentence deck for a frequency-ordered vocabulary list
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file; relative paths inside it resolve against its directory
    #[arg(short, long, global = true, default_value = "deck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lemmatize, count and sweep the deck, demoting sentences that add too few rare words
    Partition,
    /// Parse the deck's unlemmatized sentences with the language model
    Parse,
    /// Generate sentences for pending rows, then parse and partition, for the configured number of rounds
    Generate {
        /// Override the configured number of rounds
        #[arg(short, long)]
        iterations: Option<usize>,
    },
    /// Append new words from a `word|pos|translation` list
    Import {
        word_list: PathBuf,
    },
    /// Write the deck as frequency parts next to the deck file
    Split,
}

fn chat_client(model: &str, config: &Config) -> anyhow::Result<ChatClient> {
    Ok(ChatClient::from_env(model)
        .context("OPENAI_API_KEY environment variable not set")?
        .with_cache_directory(&config.paths.llm_cache))
}

fn partition(
    config: &Config,
    deck: Deck,
    overrides: &BaseformOverrides,
) -> anyhow::Result<PartitionOutcome> {
    let parses =
        ParseCache::load(&config.paths.parse_cache).context("Failed to load parse cache")?;
    let checkpoint = DiskCheckpoint::new(&config.paths, config.index);
    let outcome = Partitioner::new(config, &parses, &checkpoint).run(deck, overrides)?;
    Ok(outcome)
}

async fn parse(config: &Config, deck: &Deck, chat_client: &ChatClient) -> anyhow::Result<usize> {
    nlp::parse_missing(
        nlp::sentences_to_parse(deck, config),
        &config.paths.parse_cache,
        config.course.target_language,
        chat_client,
        config.nlp.concurrency,
    )
    .await
}

async fn generate(config: &Config, iterations: usize) -> anyhow::Result<()> {
    let generator = chat_client(&config.generation.model, config)?;
    let parser = chat_client(&config.nlp.model, config)?;
    let mut rng = match config.generation.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };

    let mut deck = Deck::load(&config.paths.deck, config.index)?;
    let mut overrides = BaseformOverrides::load(&config.paths.baseform_overrides, config.index)?;

    for iteration in 1..=iterations {
        println!();
        println!("Round {iteration}/{iterations}");
        println!("================================================");

        let merged = match generation::generate_round(config, &generator, deck, &mut rng).await {
            Ok((merged, _)) => merged,
            Err(e)
                if matches!(
                    e.downcast_ref::<DeckError>(),
                    Some(DeckError::NothingToGenerate)
                ) =>
            {
                log::info!("Every row has a sentence, stopping after {} rounds", iteration - 1);
                break;
            }
            Err(e) => return Err(e.context(format!("Round {iteration} failed"))),
        };

        parse(config, &merged, &parser).await?;
        let outcome = partition(config, merged, &overrides)?;
        println!(
            "{} rows with a sentence, {} still pending",
            outcome.kept, outcome.pending
        );
        deck = outcome.deck;
        overrides = outcome.overrides;
    }

    println!(
        "Total cost: ${:.2}",
        generator.cost().unwrap_or(0.0) + parser.cost().unwrap_or(0.0)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    match args.command {
        Command::Partition => {
            let deck = Deck::load(&config.paths.deck, config.index)?;
            let overrides =
                BaseformOverrides::load(&config.paths.baseform_overrides, config.index)?;
            let outcome = partition(&config, deck, &overrides)?;
            println!(
                "Kept {}, demoted {}, {} outside the length band, {} waiting for a sentence",
                outcome.kept, outcome.demoted, outcome.out_of_band, outcome.pending
            );
        }
        Command::Parse => {
            let deck = Deck::load(&config.paths.deck, config.index)?;
            let parser = chat_client(&config.nlp.model, &config)?;
            let parsed = parse(&config, &deck, &parser).await?;
            println!(
                "Parsed {parsed} sentences (${:.2})",
                parser.cost().unwrap_or(0.0)
            );
        }
        Command::Generate { iterations } => {
            generate(&config, iterations.unwrap_or(config.generation.iterations)).await?;
        }
        Command::Import { word_list } => {
            let deck = if config.paths.deck.exists() {
                Deck::load(&config.paths.deck, config.index)?
            } else {
                log::info!(
                    "No deck at {}, starting a new one",
                    config.paths.deck.display()
                );
                Deck::empty(config.index)
            };
            let entries = import::load_word_list(&word_list)
                .with_context(|| format!("Failed to read word list {}", word_list.display()))?;
            let known = match &config.paths.known_words {
                Some(path) => import::load_known_words(path)?,
                None => Default::default(),
            };
            let (deck, stats) = import::import(deck, entries, &known)?;
            deck.save(&config.paths.deck)
                .context("Failed to write deck")?;
            println!(
                "Imported {} words and {} extra senses, skipped {}",
                stats.headwords, stats.senses, stats.skipped
            );
        }
        Command::Split => {
            let deck = Deck::load(&config.paths.deck, config.index)?;
            let paths = split::write_parts(&deck, &config.split.boundaries, &config.paths.deck)?;
            println!("Wrote {} parts", paths.len());
        }
    }

    Ok(())
}
