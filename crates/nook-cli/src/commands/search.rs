use crate::commands::common::{
    format_note_lines, normalize_search_query, note_to_list_item, NoteListItem, StoreTarget,
};
use crate::error::CliError;

pub fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    target: &StoreTarget,
) -> Result<(), CliError> {
    let query = normalize_search_query(query)?;
    let notes = target.open()?.search_notes(&query, limit)?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes match '{query}'.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
