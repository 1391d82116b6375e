use serde::Serialize;

use crate::commands::common::{normalize_category, resolve_note, StoreTarget};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CategoryItem {
    pub category: String,
    pub notes: usize,
}

pub fn run_set_category(
    id: &str,
    path: Option<&str>,
    target: &StoreTarget,
) -> Result<(), CliError> {
    let store = target.open()?;
    let note = resolve_note(id, &store)?;
    let category = normalize_category(path);
    let updated = store.set_category(&note.id, category.as_deref())?;

    match updated.category {
        Some(category) => println!("{} {category}", updated.id),
        None => println!("{} (uncategorized)", updated.id),
    }
    Ok(())
}

pub fn run_categories(as_json: bool, target: &StoreTarget) -> Result<(), CliError> {
    let categories = target
        .open()?
        .categories()?
        .into_iter()
        .map(|(category, notes)| CategoryItem { category, notes })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
        return Ok(());
    }

    if categories.is_empty() {
        println!("No categories yet.");
        return Ok(());
    }

    for item in categories {
        println!("{:<40}  {}", item.category, item.notes);
    }
    Ok(())
}
