use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use nook_core::db::NoteStore;
use nook_core::{Note, NoteId};
use serde::Serialize;

use crate::accounts::AccountsConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub remote_id: Option<i64>,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub category: Option<String>,
    pub favorite: bool,
    pub modified: i64,
    pub relative_time: String,
    pub sync_state: String,
}

/// Options shared by every command that touches the local store.
#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub db_path: PathBuf,
    pub account: String,
}

impl StoreTarget {
    pub fn resolve(cli_db_path: Option<PathBuf>, cli_account: Option<&str>) -> Result<Self, CliError> {
        let config = AccountsConfig::load().map_err(CliError::Config)?;
        Ok(Self {
            db_path: resolve_db_path(cli_db_path)?,
            account: config.resolve_account_name(cli_account),
        })
    }

    pub fn open(&self) -> Result<NoteStore, CliError> {
        Ok(NoteStore::open(&self.db_path, &self.account)?)
    }
}

pub fn list_notes(
    store: &NoteStore,
    limit: usize,
    category: Option<&str>,
    favorites: bool,
) -> Result<Vec<Note>, CliError> {
    let notes = match (category, favorites) {
        (Some(category), _) => {
            let mut notes = store.list_notes_by_category(category, limit, 0)?;
            if favorites {
                notes.retain(|note| note.favorite);
            }
            notes
        }
        (None, true) => store.list_favorites(limit)?,
        (None, false) => store.list_notes(limit, 0)?,
    };
    Ok(notes)
}

pub fn resolve_note(note_query: &str, store: &NoteStore) -> Result<Note, CliError> {
    let note_query = normalize_note_identifier(note_query)?;
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = store.get_note(&note_id)? {
            return Ok(note);
        }
    }

    let matching_ids = store.list_note_ids_by_prefix(&note_query, 3)?;

    match matching_ids.len() {
        0 => Err(CliError::NoteNotFound(note_query)),
        1 => {
            let resolved_id = matching_ids[0]
                .parse::<NoteId>()
                .map_err(|_| CliError::NoteNotFound(note_query.clone()))?;
            store
                .get_note(&resolved_id)?
                .ok_or(CliError::NoteNotFound(note_query))
        }
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if note.favorite { '*' } else { ' ' };
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.modified, now_ms);
            let pending = if note.dirty.is_dirty() { "~" } else { "" };

            match note.category.as_deref() {
                Some(category) => format!(
                    "{short_id:<13} {marker} {preview:<40}  {relative_time:<10}  [{category}]{pending}"
                ),
                None => format!("{short_id:<13} {marker} {preview:<40}  {relative_time}{pending}"),
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        remote_id: note.remote_id.map(|remote_id| remote_id.0),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        category: note.category.clone(),
        favorite: note.favorite,
        modified: note.modified,
        relative_time: format_relative_time(note.modified, now_ms),
        sync_state: note.dirty.to_string(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = if note.title.trim().is_empty() {
        note.content.lines().next().unwrap_or("")
    } else {
        note.title.as_str()
    };
    let collapsed = nook_core::util::compact_text(source);

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Category paths are kept verbatim apart from surrounding whitespace.
pub fn normalize_category(category: Option<&str>) -> Option<String> {
    nook_core::util::normalize_text_option(category.map(str::to_string))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("nook-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("NOOK_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("nook").join("nook.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}
