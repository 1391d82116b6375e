use crate::commands::common::{format_note_lines, list_notes, note_to_list_item, NoteListItem, StoreTarget};
use crate::error::CliError;

pub fn run_list(
    limit: usize,
    category: Option<&str>,
    favorites: bool,
    as_json: bool,
    target: &StoreTarget,
) -> Result<(), CliError> {
    let store = target.open()?;
    let notes = list_notes(&store, limit, category, favorites)?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
