use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::helpers::html_escape;

/// Characters escaped when an entry name is placed inside an href.
const HREF_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'%');

/// One line of a LIST response, reduced to what the index page needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Parses raw Unix-style LIST output into entries.
///
/// Classification is positional: a line starting with `d` is a directory, a
/// line starting with `-` a regular file, and the trailing
/// whitespace-delimited token is the entry name. Anything else (`total`
/// headers, symlinks, blank lines) is skipped, as are the literal `.` and
/// `..` entries.
pub fn parse_listing(raw: &str) -> Vec<ListingEntry> {
    raw.lines()
        .filter_map(|line| {
            let is_dir = match line.as_bytes().first() {
                Some(b'd') => true,
                Some(b'-') => false,
                _ => return None,
            };
            let name = line.split_whitespace().next_back()?;
            if name == "." || name == ".." {
                return None;
            }
            Some(ListingEntry {
                name: name.to_string(),
                is_dir,
            })
        })
        .collect()
}

/// Renders the minimal generated index page for a directory listing.
///
/// Directories are linked with a trailing separator so following the link
/// produces another listing request.
pub fn render_index(remote_path: &str, entries: &[ListingEntry]) -> String {
    let display_path = if remote_path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", remote_path)
    };

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html>\n<head><title>Index of ");
    page.push_str(&html_escape(&display_path));
    page.push_str("</title></head>\n<body>\n<h1>Index of ");
    page.push_str(&html_escape(&display_path));
    page.push_str("</h1>\n<ul>\n");

    for entry in entries {
        let encoded = utf8_percent_encode(&entry.name, HREF_SEGMENT).to_string();
        let (href_suffix, label_suffix) = if entry.is_dir { ("/", "/") } else { ("", "") };
        page.push_str(&format!(
            "<li><a href=\"{}{}{}\">{}{}</a></li>\n",
            html_escape(&display_path),
            html_escape(&encoded),
            href_suffix,
            html_escape(&entry.name),
            label_suffix,
        ));
    }

    page.push_str("</ul>\n</body>\n</html>\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directories_and_files() {
        let raw = "drwxr-xr-x 2 user group 4096 Jan 1 00:00 subdir\n\
                   -rw-r--r-- 1 user group 1234 Jan 1 00:00 song.mp3\n";
        let entries = parse_listing(raw);
        assert_eq!(
            entries,
            vec![
                ListingEntry { name: "subdir".to_string(), is_dir: true },
                ListingEntry { name: "song.mp3".to_string(), is_dir: false },
            ]
        );
    }

    #[test]
    fn suppresses_dot_entries_and_headers() {
        let raw = "total 8\n\
                   drwxr-xr-x 2 user group 4096 Jan 1 00:00 .\n\
                   drwxr-xr-x 2 user group 4096 Jan 1 00:00 ..\n\
                   -rw-r--r-- 1 user group 10 Jan 1 00:00 a.txt\n";
        let entries = parse_listing(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }

    #[test]
    fn handles_crlf_terminated_lines() {
        let entries = parse_listing("-rw-r--r-- 1 u g 10 Jan 1 00:00 b.bin\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b.bin");
    }

    #[test]
    fn directories_link_with_trailing_separator() {
        let entries = vec![
            ListingEntry { name: "subdir".to_string(), is_dir: true },
            ListingEntry { name: "song.mp3".to_string(), is_dir: false },
        ];
        let page = render_index("music", &entries);
        assert!(page.contains("href=\"/music/subdir/\""));
        assert!(page.contains(">subdir/</a>"));
        assert!(page.contains("href=\"/music/song.mp3\""));
        assert!(page.contains(">song.mp3</a>"));
    }

    #[test]
    fn escapes_hostile_entry_names() {
        let entries = vec![ListingEntry {
            name: "<script>.txt".to_string(),
            is_dir: false,
        }];
        let page = render_index("", &entries);
        assert!(!page.contains("<script>"));
    }
}
