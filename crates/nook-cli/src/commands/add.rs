use nook_core::NoteDraft;

use crate::commands::common::{normalize_category, resolve_note_content, StoreTarget};
use crate::error::CliError;

pub fn run_add(
    content_parts: &[String],
    title: Option<&str>,
    category: Option<&str>,
    target: &StoreTarget,
) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;
    let mut draft = NoteDraft::from_content(content).with_category(normalize_category(category));
    if let Some(title) = title {
        draft = draft.with_title(title);
    }

    let store = target.open()?;
    let note = store.create_note(draft)?;

    println!("{}", note.id);
    Ok(())
}
