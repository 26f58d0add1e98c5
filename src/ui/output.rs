use colored::*;

use crate::normalize::ResultRecord;

/// Print search results to the terminal.
///
/// Truncation to the top result is a display choice made here, not by the
/// normalizer; `show_all` turns it off. The true count is always reported.
pub fn display_results(records: &[ResultRecord], show_all: bool) {
    if records.is_empty() {
        println!("{}", "No results found".yellow());
        return;
    }

    if records.len() > 1 && !show_all {
        println!(
            "{}",
            format!("Found {} result(s), displaying top result", records.len()).green()
        );
    } else {
        println!("{}", format!("Found {} result(s)", records.len()).green());
    }

    let shown = if show_all { records } else { &records[..1] };
    for record in shown {
        println!();
        if let Some(title) = &record.title {
            println!("{}", title.cyan().bold());
        }
        if let Some(content) = &record.content {
            println!("{}", content);
        }
        if let Some(link) = &record.link {
            // Links survive normalization only if they are http(s).
            println!("{}", link.dimmed());
        }
    }
}

/// Dump the progress log to stderr, dimmed, one line per event.
pub fn display_events(events: &[String]) {
    for event in events {
        eprintln!("{}", format!("[docsearch] {}", event).dimmed());
    }
}
