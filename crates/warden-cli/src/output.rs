//! Rendering of daemon replies for the terminal.

use std::io::{self, Write};

use unicode_width::UnicodeWidthStr;
use warden_rpc::ProgramStatus;

const NAME_COLUMN: usize = 10;
const STATUS_COLUMN: usize = 8;

/// Writes one `<name>\t<status>\t<extra>` row per program, padding the name
/// and status to fixed display widths so wide characters stay aligned.
pub(crate) fn render_status_table<W: Write>(
    programs: &[ProgramStatus],
    out: &mut W,
) -> io::Result<()> {
    for program in programs {
        writeln!(
            out,
            "{}\t{}\t{}",
            pad(&program.name, NAME_COLUMN),
            pad(program.status.as_str(), STATUS_COLUMN),
            program.extra
        )?;
    }
    out.flush()
}

fn pad(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(padding))
}
