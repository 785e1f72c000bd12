pub mod index_panel;
pub mod transcript;

pub use index_panel::{IndexPanelState, usage_summary};
pub use transcript::{
    BUBBLE_MAX_LEN, TranscriptRow, build_transcript, chip_status_label, qa_export_text,
    split_long_text,
};
