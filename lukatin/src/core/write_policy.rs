//! Path and content checks applied before a `Write` is proposed.

use std::path::Path;

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "txt", "doc", "docx"];

const DOC_BASENAMES: &[&str] = &[
    "readme",
    "changelog",
    "license",
    "contributing",
    "authors",
    "todo",
    "roadmap",
];

const WINDOWS_SENSITIVE: &[&str] = &[
    "c:\\windows\\",
    "c:\\program files\\",
    "c:\\program files (x86)\\",
    "\\system32\\",
    "\\syswow64\\",
];

const UNIX_SENSITIVE: &[&str] = &[
    "/etc/", "/bin/", "/sbin/", "/usr/bin/", "/usr/sbin/", "/sys/", "/proc/", "/dev/", "/boot/",
];

const SECRET_MARKERS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "private_key",
    "ssh_key",
    "credential",
    "auth_token",
];

/// True for documentation-like files that should not be created unasked.
pub fn is_documentation_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();

    let has_doc_extension = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOC_EXTENSIONS.contains(&ext));
    if has_doc_extension {
        return true;
    }

    DOC_BASENAMES.iter().any(|base| {
        name == *base
            || name
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// True for system locations that must never be written.
pub fn is_sensitive_path(path: &Path) -> bool {
    let normalized = path.to_string_lossy().to_lowercase();
    if WINDOWS_SENSITIVE.iter().any(|p| normalized.contains(p)) {
        return true;
    }
    UNIX_SENSITIVE.iter().any(|p| normalized.starts_with(p))
}

/// Secret-like markers present in `content`, in declaration order.
pub fn secret_markers(content: &str) -> Vec<&'static str> {
    let lowered = content.to_lowercase();
    SECRET_MARKERS
        .iter()
        .copied()
        .filter(|marker| lowered.contains(marker))
        .collect()
}
