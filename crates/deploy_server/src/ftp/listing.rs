//! `LIST`/`NLST` output.
//!
//! `LIST` uses the `ls -l` layout nearly every client parses:
//!
//! ```text
//! -rw-r--r-- 1 ftp ftp         5120 Mar 09 17:05 Demo.jar
//! ```
//!
//! Entries older than half a year show the year instead of the time.

use crate::session::{DirEntry, EntryKind};
use chrono::{DateTime, Duration, Utc};

pub fn format_list(entries: &[DirEntry], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&list_line(entry, now));
        out.push_str("\r\n");
    }
    out
}

pub fn format_nlst(entries: &[DirEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.name);
        out.push_str("\r\n");
    }
    out
}

fn list_line(entry: &DirEntry, now: DateTime<Utc>) -> String {
    let modified = entry.modified.unwrap_or_default();
    let stamp = if now.signed_duration_since(modified) > Duration::days(182) || modified > now {
        modified.format("%b %d  %Y")
    } else {
        modified.format("%b %d %H:%M")
    };

    format!(
        "{}{} 1 ftp ftp {:>12} {} {}",
        type_char(entry.kind),
        permission_string(entry.mode),
        entry.size,
        stamp,
        entry.name
    )
}

fn type_char(kind: EntryKind) -> char {
    match kind {
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::File => '-',
    }
}

fn permission_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}
