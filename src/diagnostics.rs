use crate::config::{CONFIG_FILE_NAME, LOCK_FILE_NAME};
use crate::error::Error;

/// ANSI bold, used for headings.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
    return;
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { field, reason } => render_config_invalid(field, reason),
        Error::ConfigNotFound { path } => format!(
            "\
# Error: Config Not Found

`{}` does not exist.

## Fix

Pass an existing file to `--config`, or drop the flag to use `{CONFIG_FILE_NAME}` at the project root.
",
            path.display()
        ),
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),
        Error::InvalidUtf8 { path } => format!(
            "\
# Error: Not UTF-8

`{}` is not valid UTF-8.

## Fix

Set `lossy_utf8 = true` in `{CONFIG_FILE_NAME}` to decode it with replacement characters.
",
            path.display()
        ),
        Error::LockHeld { path, pid } => render_lock_held(&path.display().to_string(), *pid),
        Error::PathOutsideRoot { path } => format!(
            "\
# Error: Path Outside Project

`{}` is not inside the project root.

## Fix

Pick a path under the root, or point `--root` at a directory that contains it.
",
            path.display()
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid Config

{e}

## Fix

Correct `{CONFIG_FILE_NAME}`. Unknown keys are rejected.
"
        ),
        Error::Io(_)
        | Error::Json(_)
        | Error::LoggingInit { .. }
        | Error::Persist { .. }
        | Error::SignalSetup { .. }
        | Error::Watch(_) => render_generic(e),
    };
}

/// Invalid option value.
fn render_config_invalid(field: &str, reason: &str) -> String {
    return format!(
        "\
# Error: Invalid Config Option

`{field}`: {reason}

## Fix

Edit `{field}` in `{CONFIG_FILE_NAME}`, or remove it to use the default.
"
    );
}

/// Errors with nothing more to say than their message.
fn render_generic(e: &Error) -> String {
    return format!(
        "\
# Error

{e}
"
    );
}

/// Another watcher owns the tree.
fn render_lock_held(path: &str, pid: u32) -> String {
    return format!(
        "\
# Error: Already Watching

Process {pid} holds `{path}`.

## Fix

Only one watcher may run per tree. Stop process {pid}, or if it is gone,
delete `{LOCK_FILE_NAME}` and retry.
"
    );
}
