//! File name classification and normalization
//!
//! "Stripped" names drop disc qualifiers such as `(Disc 1)` so that the
//! files of one multi-disc or multi-track game compare equal.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z"];
pub const ARTWORK_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
/// Extensions that may belong to a multi-file disc image
pub const CD_EXTENSIONS: &[&str] = &[
    "cue", "ccd", "img", "iso", "bin", "sub", "m3u", "mds", "mdf", "chd", "pbp",
];
/// Primary file of a multi-file disc image
pub const DESCRIPTOR_EXTENSIONS: &[&str] = &["cue", "ccd", "mds"];
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u"];

/// Files that are never import candidates
const IGNORED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "__MACOSX"];

/// Lower-case extension without the dot, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_extension_in(path: &Path, set: &[&str]) -> bool {
    let ext = extension_of(path);
    set.contains(&ext.as_str())
}

pub fn is_archive(path: &Path) -> bool {
    has_extension_in(path, ARCHIVE_EXTENSIONS)
}

pub fn is_artwork(path: &Path) -> bool {
    has_extension_in(path, ARTWORK_EXTENSIONS)
}

pub fn is_cd_file(path: &Path) -> bool {
    has_extension_in(path, CD_EXTENSIONS)
}

pub fn is_descriptor(path: &Path) -> bool {
    has_extension_in(path, DESCRIPTOR_EXTENSIONS)
}

pub fn is_playlist(path: &Path) -> bool {
    has_extension_in(path, PLAYLIST_EXTENSIONS)
}

/// Hidden files and OS bookkeeping files
pub fn is_hidden_or_marker(path: &Path) -> bool {
    let name = file_name_of(path);
    name.starts_with('.') || IGNORED_NAMES.contains(&name.as_str())
}

/// Remove `(Disc ...)` qualifiers from a name
pub fn strip_disc_names(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        // `(Disc 2)` and `(Disc)` but not `(Discovery)`
        let is_disc = after
            .get(..4)
            .map(|w| w.eq_ignore_ascii_case("disc"))
            .unwrap_or(false)
            && !after[4..].chars().next().is_some_and(char::is_alphabetic);
        match (is_disc, after.find(')')) {
            (true, Some(close)) => {
                out.push_str(rest[..open].trim_end());
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// File stem with disc qualifiers removed
pub fn stripped_stem(path: &Path) -> String {
    strip_disc_names(&stem_of(path))
}

/// Title part of a file name: the stripped stem up to its first bracketed
/// qualifier, lower-cased
///
/// `Game (Track 1)` and `Game (USA)` both give `game`.
pub fn title_key(path: &Path) -> String {
    let stripped = stripped_stem(path);
    let cut = stripped.find(['(', '[']).unwrap_or(stripped.len());
    stripped[..cut].trim().to_lowercase()
}

/// Whether `other_stem`, stripped and cut to the length of `stripped`,
/// equals `stripped`
///
/// `Game (Track 1)` matches `Game`; so does `Game (Disc 2)`.
pub fn matches_stripped(other_stem: &str, stripped: &str) -> bool {
    if stripped.is_empty() {
        return false;
    }
    let other = strip_disc_names(other_stem);
    let len = stripped.chars().count();
    if other.chars().count() < len {
        return false;
    }
    other.chars().take(len).eq(stripped.chars())
}

/// Name used for the reference database's title search
///
/// Keeps letters, digits, whitespace and `,-+&.'`; everything from the first
/// other character on is dropped. `Super Mario Bros. (USA)` becomes
/// `Super Mario Bros.`.
pub fn metadata_search_name(stem: &str) -> Option<String> {
    let cut = stem
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || c.is_whitespace() || ",-+&.'".contains(*c)))
        .map(|(idx, _)| idx)
        .unwrap_or(stem.len());
    let name = stem[..cut].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Catalog-relative path of a file in a system's storage directory
pub fn relative_rom_path(system_id: &str, file_name: &str) -> String {
    format!("{}/{}", system_id, file_name)
}

fn group_rank(path: &Path) -> u8 {
    match extension_of(path).as_str() {
        "m3u" => 0,
        "cue" => 1,
        _ if is_artwork(path) => 3,
        _ => 2,
    }
}

/// Order in which a batch is processed
///
/// Playlists first, then cue sheets, then everything else, images last.
/// Inside a group: stripped name, then extension descending, then file name.
pub fn sort_for_import(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        group_rank(a)
            .cmp(&group_rank(b))
            .then_with(|| stripped_stem(a).cmp(&stripped_stem(b)))
            .then_with(|| match extension_of(b).cmp(&extension_of(a)) {
                Ordering::Equal => file_name_of(a).cmp(&file_name_of(b)),
                other => other,
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_disc_names() {
        assert_eq!(strip_disc_names("Final Fantasy VII (Disc 1)"), "Final Fantasy VII");
        assert_eq!(strip_disc_names("Game (disc 2 of 3) (USA)"), "Game (USA)");
        assert_eq!(strip_disc_names("Game (Track 1)"), "Game (Track 1)");
        assert_eq!(strip_disc_names("Game (Disc)"), "Game");
        assert_eq!(
            strip_disc_names("Planet (Discovery Edition)"),
            "Planet (Discovery Edition)"
        );
        assert_eq!(strip_disc_names("Game (Disc2)"), "Game");
    }

    #[test]
    fn test_title_key() {
        assert_eq!(title_key(Path::new("Game (Track 1).bin")), "game");
        assert_eq!(title_key(Path::new("GAME [!] (Disc 2).cue")), "game");
        assert_eq!(title_key(Path::new("Other Game.bin")), "other game");
    }

    #[test]
    fn test_matches_stripped() {
        assert!(matches_stripped("Game (Track 1)", "Game"));
        assert!(matches_stripped("Game (Disc 2)", "Game"));
        assert!(matches_stripped("Game", "Game"));
        assert!(!matches_stripped("Gam", "Game"));
        assert!(!matches_stripped("Other (Track 1)", "Game"));
        assert!(!matches_stripped("Anything", ""));
    }

    #[test]
    fn test_metadata_search_name() {
        assert_eq!(
            metadata_search_name("Super Mario Bros. (USA)").as_deref(),
            Some("Super Mario Bros.")
        );
        assert_eq!(metadata_search_name("Tetris").as_deref(), Some("Tetris"));
        assert_eq!(
            metadata_search_name("Rock n' Roll Racing [!]").as_deref(),
            Some("Rock n' Roll Racing")
        );
        assert_eq!(metadata_search_name("(Beta)"), None);
    }

    #[test]
    fn test_hidden_and_marker_files() {
        assert!(is_hidden_or_marker(Path::new("/x/.DS_Store")));
        assert!(is_hidden_or_marker(Path::new("/x/.partial")));
        assert!(is_hidden_or_marker(Path::new("/x/Thumbs.db")));
        assert!(is_hidden_or_marker(Path::new("/x/__MACOSX")));
        assert!(!is_hidden_or_marker(Path::new("/x/Game.nes")));
    }

    #[test]
    fn test_sort_for_import() {
        let mut paths: Vec<PathBuf> = [
            "Game.nes.png",
            "Zelda.nes",
            "Game (Track 1).bin",
            "Game.cue",
            "Game.m3u",
            "Alpha.sfc",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        sort_for_import(&mut paths);

        let names: Vec<_> = paths.iter().map(|p| file_name_of(p)).collect();
        assert_eq!(
            names,
            vec![
                "Game.m3u",
                "Game.cue",
                "Alpha.sfc",
                "Game (Track 1).bin",
                "Zelda.nes",
                "Game.nes.png",
            ]
        );
    }
}
