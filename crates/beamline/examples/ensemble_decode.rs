//! Ensemble decoding example.
//!
//! Decodes two sentences with a translation model and a language model,
//! printing the n-best list with per-scorer breakdowns and alignments.
//!
//! Run with `RUST_LOG=beamline=debug` to see every step.

use anyhow::Result;
use beamline::prelude::*;
use tracing_subscriber::EnvFilter;

/// Toy target vocabulary.
const VOCAB: &[&str] = &["</s>", "<unk>", "the", "cat", "sat", "on", "mat"];

/// Translation model: confident, prefers "the cat sat".
fn translation_model() -> Result<BigramModel> {
    let start = vec![-9.0, -0.5, -0.2, -2.0, -4.0, -4.0, -4.0];
    let table = ScoreMatrix::from_rows(&[
        [-9.0, -9.0, -9.0, -9.0, -9.0, -9.0, -9.0], // </s>
        [-1.0, -9.0, -1.0, -1.0, -1.0, -1.0, -1.0], // <unk>
        [-5.0, -0.3, -6.0, -0.4, -3.0, -4.0, -1.5], // the
        [-2.5, -1.0, -4.0, -6.0, -0.3, -3.0, -5.0], // cat
        [-0.6, -1.0, -3.0, -5.0, -6.0, -0.9, -5.0], // sat
        [-4.0, -1.0, -0.2, -5.0, -5.0, -6.0, -2.0], // on
        [-0.1, -1.0, -4.0, -5.0, -5.0, -3.0, -6.0], // mat
    ])?;
    Ok(BigramModel::new("F0", start, table)?.with_attention(4))
}

/// Language model: likes longer, fluent sentences.
fn language_model() -> Result<BigramModel> {
    let start = vec![-6.0, -6.0, -0.1, -3.0, -5.0, -5.0, -5.0];
    let table = ScoreMatrix::from_rows(&[
        [-6.0, -6.0, -6.0, -6.0, -6.0, -6.0, -6.0],
        [-2.0, -6.0, -2.0, -2.0, -2.0, -2.0, -2.0],
        [-5.0, -6.0, -6.0, -0.7, -4.0, -5.0, -0.9],
        [-3.0, -6.0, -4.0, -6.0, -0.2, -4.0, -5.0],
        [-2.0, -6.0, -4.0, -5.0, -6.0, -0.1, -5.0],
        [-4.0, -6.0, -0.1, -5.0, -5.0, -6.0, -3.0],
        [-0.1, -6.0, -4.0, -5.0, -5.0, -3.0, -6.0],
    ])?;
    Ok(BigramModel::new("LM", start, table)?.with_attention(4))
}

fn render(tokens: &[u32]) -> String {
    tokens
        .iter()
        .map(|&t| VOCAB.get(t as usize).copied().unwrap_or("<?>"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let translator = Translator::builder()
        .beam_size(4)
        .weight("F0", 1.0)
        .weight("LM", 0.5)
        .n_best(true)
        .soft_alignment(true)
        .normalize(true)
        .max_length(10)
        .build()?;

    println!("=== Ensemble Decode ===\n");
    println!("Scorers: F0 (w=1.0), LM (w=0.5)");
    println!("Beam size: {}\n", translator.config().beam_size);

    let mut models: Vec<Box<dyn StepModel>> =
        vec![Box::new(translation_model()?), Box::new(language_model()?)];
    let results = translator.decode(&mut models, &[0, 1])?;

    for result in &results {
        println!("Sentence {}:", result.sentence);
        for (rank, entry) in result.nbest.iter().enumerate() {
            println!(
                "  {}. {:<20} cost={:>7.3} score={:>7.3} F0={:>7.3} LM={:>7.3}",
                rank + 1,
                render(&entry.tokens),
                entry.cost,
                entry.score,
                entry.breakdown.first().copied().unwrap_or_default(),
                entry.breakdown.get(1).copied().unwrap_or_default(),
            );
            if let Some(steps) = &entry.alignments {
                println!("     alignment steps: {}", steps.len());
            }
        }
        println!();
    }

    let stats = translator.stats();
    println!("Stats:");
    println!("  Sentences: {}", stats.sentences);
    println!("  Steps: {}", stats.steps);
    println!("  Candidates scored: {}", stats.candidates);
    println!("  Hypotheses created: {}", stats.hypotheses);

    Ok(())
}
