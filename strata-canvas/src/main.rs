//! Strata Canvas: builds a demo page, edits it with undo/redo and round
//! trips it through a document file.
//!
//! Usage: `strata-canvas [path]` (default `page.json`). Set `RUST_LOG=debug`
//! to see the load/save summaries.

use log::info;

use strata_canvas::canvas_registry;
use strata_canvas::demo::{DemoPage, PageSummary};
use strata_canvas::model::Page;
use strata_model::{DocumentConfig, DocumentReader, DocumentWriter, HistoryConfig, Result, UndoHistory};

fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "page.json".to_string());
    info!("Starting Strata Canvas...");

    let registry = canvas_registry()?;
    let demo = DemoPage::build()?;
    info!("Built {}", PageSummary::of(&demo.page)?);

    let mut history = UndoHistory::new(HistoryConfig::default());
    let steps = demo.run_session(&mut history)?;
    info!("Edited: {}", PageSummary::of(&demo.page)?);

    for _ in 0..steps {
        history.undo()?;
    }
    info!("After undo: {}", PageSummary::of(&demo.page)?);
    while history.redo()? {}
    info!("After redo: {}", PageSummary::of(&demo.page)?);

    DocumentWriter::new(DocumentConfig::default()).save_file(&demo.page, &path)?;
    history.mark_saved();

    let loaded = DocumentReader::new(&registry).load_file::<Page>(&path)?;
    info!("Reloaded {}", PageSummary::of(&loaded)?);
    Ok(())
}
