//! Asking the language model for example sentences.
//!
//! Rows without a sentence are shuffled, cut into blocks and sent as a small
//! `|` table; the model answers with the same table extended by part of
//! speech, translation and a sentence pair. Requests, raw responses and the
//! cleaned rows are written to the batch directory before anything is merged
//! into the deck.

use std::io;
use std::path::Path;

use anyhow::Context;
use futures::StreamExt;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use language_utils::Course;
use language_utils::text_cleanup::{cleanup_field, cleanup_sentence};
use rand::Rng;
use rand::seq::SliceRandom;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tysm::chat_completions::ChatClient;

use crate::checkpoint::write_atomically;
use crate::config::{Config, GenerationSettings, LengthBand, SentenceLength};
use crate::deck::{Deck, DeckRow};
use crate::error::{DeckError, Result};
use crate::index::{CompositeIndex, IndexGranularity};

/// Columns the model sends back: index, word, part of speech, translation,
/// sentence, translated sentence
const RESPONSE_COLUMNS: usize = 6;

/// Pick the rows to generate for this round, already cut into blocks.
pub fn select_pending<'d, R: Rng + ?Sized>(
    deck: &'d Deck,
    settings: &GenerationSettings,
    rng: &mut R,
) -> Result<Vec<Vec<&'d DeckRow>>> {
    let mut pending = deck
        .iter()
        .filter(|row| !row.has_sentence())
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Err(DeckError::NothingToGenerate);
    }

    let blocks = settings
        .blocks_per_iteration
        .min(pending.len().div_ceil(settings.block_size));
    pending.shuffle(rng);
    pending.truncate(settings.block_size * blocks);

    Ok(pending
        .chunks(settings.block_size)
        .map(<[_]>::to_vec)
        .collect())
}

/// One block as the `|` table the model completes
pub fn request_table(
    block: &[&DeckRow],
    settings: &GenerationSettings,
    granularity: IndexGranularity,
) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    for row in block {
        let mut record = vec![row.index.render(granularity), row.word.clone()];
        if settings.has_part_of_speech {
            record.push(row.part_of_speech.clone().unwrap_or_default());
        }
        if settings.has_translation {
            record.push(row.translation.clone().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DeckError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The band to ask for: the span of the bands of every row in the block
fn block_band(block: &[&DeckRow], lengths: &SentenceLength) -> LengthBand {
    block
        .iter()
        .map(|row| lengths.band_for(&row.index))
        .reduce(|a, b| LengthBand {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        })
        .unwrap_or(LengthBand {
            min: lengths.min,
            max: lengths.max,
        })
}

pub fn make_prompt(course: Course, band: LengthBand, settings: &GenerationSettings) -> String {
    let Course {
        target_language,
        native_language,
    } = course;

    let mut input_columns = vec![
        "Column 1 - index".to_string(),
        format!("Column 2 - {target_language} word"),
    ];
    let mut tasks = Vec::new();
    let part_of_speech = format!("Column 3 - lowercase part of speech of the {target_language} word");
    let translation = format!(
        "Column 4 - translation of the {target_language} word to {native_language}"
    );
    if settings.has_part_of_speech {
        input_columns.push(part_of_speech);
    } else {
        tasks.push(format!("- Add {part_of_speech}."));
    }
    if settings.has_translation {
        input_columns.push(translation);
    } else {
        tasks.push(format!("- Add {translation}."));
    }
    tasks.push(format!(
        "- Add column 5 - a {target_language} sentence following the guidelines. It must contain the {target_language} word from column 2."
    ));
    tasks.push(format!(
        "- Add column 6 - the {native_language} translation of that sentence. It must contain the {native_language} word from column 4."
    ));

    let LengthBand { min, max } = band;
    format!(
        r#"You are a native {target_language} speaker writing example sentences for a {native_language}-speaking learner's flashcards.

## Input table

{input_columns}

## Sentence guidelines

Each {target_language} sentence must:
- sound natural and make sense on its own
- contain the {target_language} word from column 2
- be a complete sentence with a subject and a verb
- be between {min} and {max} characters long
- prefer expressive (separable) verbs and concrete nouns over pronouns and filler words
- describe a specific, concrete situation rather than an abstract thought

Use vivid, varied vocabulary. Avoid words that appear in almost every sentence.

## Task

{tasks}

Put the completed table in the `table` field: one row per input row, columns separated by "|", no header, no row skipped, nothing else."#,
        input_columns = input_columns.join("\n"),
        tasks = tasks.join("\n"),
    )
}

/// What the model is asked to return
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedTable {
    /// The completed `|`-separated table
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub block: usize,
    pub model: String,
    pub system_prompt: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub block: usize,
    pub table: Option<String>,
    pub error: Option<String>,
}

/// A row of the model's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRow {
    pub index: CompositeIndex,
    pub word: String,
    pub part_of_speech: Option<String>,
    pub translation: Option<String>,
    pub sentence_source: String,
    pub sentence_target: Option<String>,
}

/// Pull table rows out of a response, tolerating code fences, stray pipes
/// and chatter around the table.
pub fn parse_response(text: &str, granularity: IndexGranularity) -> Vec<GeneratedRow> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.trim_matches('|').trim())
        .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
        .filter_map(|line| {
            let fields = line.split('|').map(str::trim).collect::<Vec<_>>();
            if fields.len() != RESPONSE_COLUMNS {
                log::warn!(
                    "Dropping response line with {} columns instead of {RESPONSE_COLUMNS}: {line}",
                    fields.len()
                );
                return None;
            }
            let index = match CompositeIndex::parse(fields[0], granularity) {
                Ok(index) => index,
                Err(e) => {
                    log::warn!("Dropping response line ({e}): {line}");
                    return None;
                }
            };
            let (Some(word), Some(sentence_source)) =
                (cleanup_field(fields[1]), cleanup_field(fields[4]))
            else {
                log::warn!("Dropping response line without word or sentence: {line}");
                return None;
            };
            Some(GeneratedRow {
                index,
                word,
                part_of_speech: cleanup_field(fields[2]),
                translation: cleanup_field(fields[3]),
                sentence_source,
                sentence_target: cleanup_field(fields[5]),
            })
        })
        .collect()
}

pub fn write_concatenated<W: io::Write>(
    rows: &[GeneratedRow],
    writer: W,
    granularity: IndexGranularity,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);
    for row in rows {
        writer.write_record([
            row.index.render(granularity).as_str(),
            row.word.as_str(),
            row.part_of_speech.as_deref().unwrap_or_default(),
            row.translation.as_deref().unwrap_or_default(),
            row.sentence_source.as_str(),
            row.sentence_target.as_deref().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Result of merging generated rows into the deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub merged: usize,
    pub duplicates: usize,
    pub unknown: usize,
}

/// Put generated sentences on their rows.
///
/// The first answer for an index wins and answers for indices the deck does
/// not have are ignored. The deck's word is kept as is; part of speech and
/// translation are only filled in where the deck has none. The new sentence
/// replaces any previous one and its lemmatization is cleared.
pub fn merge_responses(
    deck: Deck,
    generated: Vec<GeneratedRow>,
    course: Course,
) -> Result<(Deck, MergeStats)> {
    let mut stats = MergeStats::default();
    let mut by_index: IndexMap<CompositeIndex, GeneratedRow> = IndexMap::new();
    for row in generated {
        if by_index.contains_key(&row.index) {
            stats.duplicates += 1;
        } else {
            by_index.insert(row.index, row);
        }
    }

    let granularity = deck.granularity();
    let rows = deck
        .into_rows()
        .into_iter()
        .map(|mut row| {
            if let Some(generated) = by_index.shift_remove(&row.index) {
                if row.part_of_speech.is_none() {
                    row.part_of_speech = generated.part_of_speech;
                }
                if row.translation.is_none() {
                    row.translation = generated.translation;
                }
                row.sentence_source = Some(cleanup_sentence(
                    generated.sentence_source,
                    course.target_language,
                ));
                row.sentence_target = generated
                    .sentence_target
                    .map(|sentence| cleanup_sentence(sentence, course.native_language));
                row.lemmatized_sentence = None;
                stats.merged += 1;
            }
            row
        })
        .collect::<Vec<_>>();

    stats.unknown = by_index.len();
    if stats.unknown > 0 {
        log::warn!(
            "Ignoring {} generated rows for indices not in the deck: {}",
            stats.unknown,
            by_index
                .keys()
                .map(|index| index.render(granularity))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok((Deck::new(rows, granularity)?, stats))
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    write_atomically(path, |writer| {
        for item in items {
            serde_json::to_writer(&mut *writer, item)?;
            writeln!(writer)?;
        }
        Ok(())
    })
}

/// Ask the model for every request, `concurrency` at a time. Failed requests
/// are recorded with their error and leave their rows pending.
pub async fn request_sentences(
    chat_client: &ChatClient,
    requests: &[GenerationRequest],
    concurrency: usize,
) -> Vec<GenerationResponse> {
    let pb = ProgressBar::new(requests.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks generated ({per_sec}, ${msg}, {eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut responses = futures::stream::iter(requests)
        .map(|request| {
            let pb = pb.clone();
            async move {
                let response: std::result::Result<GeneratedTable, _> = chat_client
                    .chat_with_system_prompt(request.system_prompt.clone(), request.table.clone())
                    .await;
                pb.set_message(format!("{:.2}", chat_client.cost().unwrap_or(0.0)));
                pb.inc(1);
                match response {
                    Ok(generated) => GenerationResponse {
                        block: request.block,
                        table: Some(generated.table),
                        error: None,
                    },
                    Err(e) => {
                        log::warn!("Block {} failed: {e}", request.block);
                        GenerationResponse {
                            block: request.block,
                            table: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;

    pb.finish_with_message(format!("{:.2}", chat_client.cost().unwrap_or(0.0)));
    responses.sort_by_key(|response| response.block);
    responses
}

/// One select → request → merge round. The merged deck is written to the
/// deck path before it is returned.
pub async fn generate_round<R: Rng + ?Sized>(
    config: &Config,
    chat_client: &ChatClient,
    deck: Deck,
    rng: &mut R,
) -> anyhow::Result<(Deck, MergeStats)> {
    let granularity = deck.granularity();
    let settings = &config.generation;

    let blocks = select_pending(&deck, settings, rng)?;
    let requests = blocks
        .iter()
        .enumerate()
        .map(|(block, rows)| -> Result<GenerationRequest> {
            Ok(GenerationRequest {
                block,
                model: settings.model.clone(),
                system_prompt: make_prompt(
                    config.course,
                    block_band(rows, &config.sentence_length),
                    settings,
                ),
                table: request_table(rows, settings, granularity)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    log::info!(
        "Requesting sentences for {} rows in {} blocks",
        blocks.iter().map(Vec::len).sum::<usize>(),
        requests.len()
    );
    write_jsonl(&config.paths.parallel_requests(), &requests)
        .context("Failed to write generation requests")?;

    let responses = request_sentences(chat_client, &requests, settings.concurrency).await;
    write_jsonl(&config.paths.parallel_responses(), &responses)
        .context("Failed to write generation responses")?;

    let generated = responses
        .iter()
        .filter_map(|response| response.table.as_deref())
        .flat_map(|table| parse_response(table, granularity))
        .collect::<Vec<_>>();
    if generated.is_empty() {
        return Err(DeckError::EmptyResponseBatch {
            responses: responses.len(),
        }
        .into());
    }
    write_atomically(&config.paths.parallel_responses_concatenated(), |writer| {
        write_concatenated(&generated, writer, granularity)
    })
    .context("Failed to write concatenated responses")?;

    let (deck, stats) = merge_responses(deck, generated, config.course)?;
    log::info!(
        "Merged {} generated rows ({} duplicates, {} unknown indices)",
        stats.merged,
        stats.duplicates,
        stats.unknown
    );
    deck.save(&config.paths.deck)
        .context("Failed to write merged deck")?;
    Ok((deck, stats))
}
