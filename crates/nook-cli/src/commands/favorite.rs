use crate::commands::common::{resolve_note, StoreTarget};
use crate::error::CliError;

pub fn run_favorite(id: &str, target: &StoreTarget) -> Result<(), CliError> {
    let store = target.open()?;
    let note = resolve_note(id, &store)?;
    let updated = store.toggle_favorite(&note.id)?;

    let label = if updated.favorite { "favorite" } else { "not favorite" };
    println!("{} {label}", updated.id);
    Ok(())
}
