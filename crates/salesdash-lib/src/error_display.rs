//! User-facing error message formatting.
//!
//! Matches on typed errors (SessionError, PolarsError variants, io::ErrorKind) rather than
//! parsing strings, so each failure becomes one actionable line.

use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

use crate::error::SessionError;

/// Format a SessionError with a hint on what to do next.
pub fn user_message_from_session(err: &SessionError) -> String {
    match err {
        SessionError::MissingFile(path) => format!(
            "File not found: {}. Check the path and try again.",
            path.display()
        ),
        SessionError::EmptyFile(path) => format!(
            "{} has no data rows. Export the transactions again or pick another file.",
            path.display()
        ),
        SessionError::MissingFields(_) => format!(
            "{}. Rename the columns, add synonyms under [columns] in the config, or use --lenient.",
            err
        ),
    }
}

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check the header row and the delimiter.",
            msg
        ),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::ShapeMismatch(msg) => format!("Row shape mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::ComputeError(msg) => simplify_compute_message(msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::Interrupted => "Operation interrupted.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        ErrorKind::Other => {
            let msg = err.to_string();
            if msg.contains("Is a directory") {
                return "Path is a directory, not a file.".to_string();
            }
            return if context.is_some() {
                format!("I/O error: {}", msg)
            } else {
                msg
            };
        }
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find SessionError, PolarsError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    for cause in report.chain() {
        // Session errors already name the file
        if let Some(se) = cause.downcast_ref::<SessionError>() {
            return user_message_from_session(se);
        }
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe), path);
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None), path);
        }
    }

    // Fallback: first line of display to avoid long tracebacks
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_path(first_line.trim().to_string(), path)
}

fn with_path(msg: String, path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    }
}

/// Light cleanup for ComputeError messages: drop Polars-internal hints and keep the first line.
fn simplify_compute_message(msg: &str) -> String {
    let first = msg.lines().next().unwrap_or(msg).trim();
    let cut = first
        .find(". Try ")
        .or_else(|| first.find("; consider"))
        .unwrap_or(first.len());
    first[..cut].trim_end_matches('.').to_string()
}
