//! Single beam step example.
//!
//! Runs the decoding core by hand: one step of a two-scorer ensemble over
//! a filtered vocabulary, then backtraces the surviving hypotheses.

use beamline_core::config::DecoderConfig;
use beamline_core::matrix::ScoreMatrix;
use beamline_core::search::{BeamSizeTable, BeamStore, BestHyps, StaticScorer};

fn main() -> beamline_core::Result<()> {
    println!("=== Beam Step Demo ===\n");

    let config = DecoderConfig {
        beam_size: 3,
        n_best: true,
        softmax_filter: vec!["lexical".into()],
        ..DecoderConfig::default()
    }
    .with_weight("F0", 1.0)
    .with_weight("LM", 0.4);
    let best = BestHyps::from_config(&config)?;

    // Column c of the scores stands for full vocabulary id filter[c].
    let filter = [0u32, 1, 812, 77, 4051];
    let tm = StaticScorer::new(
        "F0",
        ScoreMatrix::from_rows(&[[-3.0, -0.1, -0.4, -0.9, -1.2]])?,
    );
    let lm = StaticScorer::new(
        "LM",
        ScoreMatrix::from_rows(&[[-2.0, -1.0, -1.5, -0.2, -0.6]])?,
    );

    let mut store = BeamStore::open([0]);
    let sizes = BeamSizeTable::uniform([0], config.beam_size);
    let beams = best.calc_beam(&mut store, &[&tm, &lm], &filter, &sizes)?;

    println!("Selected (UNK suppressed):");
    for &id in beams.get(0) {
        let hyp = store.hypothesis(0, id)?;
        println!(
            "  token={:<5} cost={:>6.3} breakdown={:?}",
            hyp.token(),
            hyp.cost(),
            hyp.breakdown()
        );
    }

    store.advance(beams)?;
    let arena = store.arena(0)?;
    println!("\nArena holds {} hypotheses", arena.len());
    for &id in store.current().get(0) {
        println!("  lineage of {:?}: {:?}", id, arena.tokens(id)?);
    }

    Ok(())
}
