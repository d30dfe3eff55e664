use crate::storage::{FilesystemError, Vault};

/// File extension of every note.
pub const NOTE_EXTENSION: &str = "md";

/// Stem used when nothing of the title survives sanitizing.
const FALLBACK_STEM: &str = "Untitled";

/// Turns a note title into a filename stem.
///
/// Keeps only ASCII letters, digits, `-`, `_` and spaces, then joins the
/// remaining words with single hyphens.
///
/// ```
/// use feednote::note::note_stem;
///
/// assert_eq!(note_stem("Hello, World!"), "Hello-World");
/// assert_eq!(note_stem("Ünïcödé only: ñ"), "ncd-only");
/// ```
pub fn note_stem(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let stem = kept.split_whitespace().collect::<Vec<_>>().join("-");
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

/// Normalizes a vault path: backslashes become `/`, empty and `.` segments
/// are dropped, leading and trailing slashes are removed.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn join(folder: &str, file: &str) -> String {
    if folder.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", folder, file)
    }
}

/// Picks a free path for a new note titled `title` inside `folder`.
///
/// Creates the folder when missing. When `<stem>.md` is taken, tries
/// `<stem>-1.md`, `<stem>-2.md`, ... until a free name is found. The checks
/// are sequential and unlocked: callers must not resolve paths for the same
/// folder concurrently.
pub async fn resolve_note_path<V: Vault>(
    vault: &V,
    folder: &str,
    title: &str,
) -> Result<String, FilesystemError> {
    let folder = normalize_path(folder);
    if !folder.is_empty() && !vault.exists(&folder).await? {
        tracing::debug!(folder = %folder, "Creating note folder");
        vault.create_folder(&folder).await?;
    }

    let stem = note_stem(title);
    let mut candidate = join(&folder, &format!("{}.{}", stem, NOTE_EXTENSION));
    let mut counter: u64 = 1;
    while vault.exists(&candidate).await? {
        candidate = join(&folder, &format!("{}-{}.{}", stem, counter, NOTE_EXTENSION));
        counter += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsVault;

    #[test]
    fn test_note_stem() {
        assert_eq!(note_stem("Foo"), "Foo");
        assert_eq!(note_stem("Rust 1.75: async   traits!"), "Rust-175-async-traits");
        assert_eq!(note_stem("  padded title "), "padded-title");
        assert_eq!(note_stem("keep-dash_and_underscore"), "keep-dash_and_underscore");
        assert_eq!(note_stem("../../etc/passwd"), "etcpasswd");
        assert_eq!(note_stem("日本語"), "Untitled");
        assert_eq!(note_stem(""), "Untitled");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("RSS Notes"), "RSS Notes");
        assert_eq!(normalize_path("/a//b/./c/"), "a/b/c");
        assert_eq!(normalize_path("a\\b\\c.md"), "a/b/c.md");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
    }

    #[tokio::test]
    async fn test_resolve_creates_folder() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FsVault::new(dir.path());

        let path = resolve_note_path(&vault, "RSS Notes", "Foo").await.unwrap();
        assert_eq!(path, "RSS Notes/Foo.md");
        assert!(dir.path().join("RSS Notes").is_dir());
    }

    #[tokio::test]
    async fn test_resolve_appends_counter_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FsVault::new(dir.path());
        vault.create_folder("Notes").await.unwrap();
        vault.create_file("Notes/Foo.md", "x").await.unwrap();

        let path = resolve_note_path(&vault, "Notes", "Foo").await.unwrap();
        assert_eq!(path, "Notes/Foo-1.md");

        vault.create_file(&path, "y").await.unwrap();
        let path = resolve_note_path(&vault, "Notes", "Foo").await.unwrap();
        assert_eq!(path, "Notes/Foo-2.md");
    }

    #[tokio::test]
    async fn test_resolve_at_vault_root() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FsVault::new(dir.path());

        let path = resolve_note_path(&vault, "", "Top level").await.unwrap();
        assert_eq!(path, "Top-level.md");
    }
}
