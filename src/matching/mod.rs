mod extract;
mod ledger;
mod pipeline;
mod placement;

pub use extract::{ReferenceExtractor, load_text_layer};
pub use ledger::Ledger;
pub use pipeline::run_pipeline;
pub use placement::Offsets;
