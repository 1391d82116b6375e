use crate::commands::common::{
    capture_editor_input_with_initial, normalize_content, resolve_note, StoreTarget,
};
use crate::error::CliError;

pub fn run_edit(id: &str, content: Option<&str>, target: &StoreTarget) -> Result<(), CliError> {
    let store = target.open()?;
    let note = resolve_note(id, &store)?;

    let edited_content = match content {
        Some(content) => normalize_content(content),
        None => capture_editor_input_with_initial(&note.content)?,
    };
    let Some(edited_content) = edited_content else {
        return Err(CliError::EmptyEditedContent);
    };

    if edited_content == note.content {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = store.update_note(&note.id, None, &edited_content)?;
    println!("{}", updated.id);
    Ok(())
}
