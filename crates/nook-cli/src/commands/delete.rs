use crate::commands::common::{resolve_note, StoreTarget};
use crate::error::CliError;

pub fn run_delete(ids: &[String], target: &StoreTarget) -> Result<(), CliError> {
    let store = target.open()?;
    let notes = ids
        .iter()
        .map(|id| resolve_note(id, &store))
        .collect::<Result<Vec<_>, _>>()?;
    let note_ids = notes.iter().map(|note| note.id).collect::<Vec<_>>();

    store.delete_notes(&note_ids)?;
    for id in note_ids {
        println!("{id}");
    }
    Ok(())
}
