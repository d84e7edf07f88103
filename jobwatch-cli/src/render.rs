use std::fmt::Write;

use libjobwatch::view::ViewSnapshot;

/// Plain-text rendering of a snapshot, one section per panel.
pub fn render(snapshot: &ViewSnapshot) -> String {
    let mut out = String::new();
    let status = snapshot.job_status();
    let _ = writeln!(out, "* job: {} ({})", status.status(), status.elapsed());

    let _ = writeln!(out, "** plays:");
    for play in snapshot.plays() {
        let marker = if Some(*play.id()) == *snapshot.active_play() {
            ">"
        } else {
            " "
        };
        let _ = writeln!(
            out,
            "{} {:>6} {:<40} {:<24} {} hosts {}",
            marker,
            play.id(),
            play.name(),
            play.status_text(),
            play.host_count(),
            play.elapsed()
        );
    }

    let _ = writeln!(out, "** tasks:");
    for task in snapshot.tasks() {
        let name = match task.role() {
            Some(role) if *snapshot.has_roles() => format!("{} : {}", role, task.name()),
            _ => task.name().clone(),
        };
        let bar = task.bar();
        let _ = writeln!(
            out,
            "  {:>6} {:<40} {:<24} ok {:>3}% changed {:>3}% skipped {:>3}% failed {:>3}%",
            task.id(),
            name,
            task.status_text(),
            bar.successful_pct(),
            bar.changed_pct(),
            bar.skipped_pct(),
            bar.failed_pct()
        );
    }

    if !snapshot.host_results().is_empty() {
        let _ = writeln!(out, "** host results:");
        for result in snapshot.host_results() {
            let _ = writeln!(
                out,
                "  {:<32} {:<12} {}",
                result.name(),
                result.status_text(),
                result.message()
            );
        }
    }

    let summary = snapshot.host_summary();
    let _ = writeln!(
        out,
        "** hosts: ok {} changed {} unreachable {} failed {} total {}",
        summary.ok(),
        summary.changed(),
        summary.unreachable(),
        summary.failed(),
        summary.total()
    );
    for host in snapshot.hosts() {
        let _ = writeln!(
            out,
            "  {:<32} ok {:>4} changed {:>4} unreachable {:>4} failed {:>4}",
            host.name(),
            host.ok(),
            host.changed(),
            host.unreachable(),
            host.failed()
        );
    }

    let ignored = snapshot.ignored();
    if ignored.total() > 0 {
        let _ = writeln!(
            out,
            "** ignored {} events (orphan {}, unknown {}, malformed {}, duplicate {})",
            ignored.total(),
            ignored.orphan(),
            ignored.unknown(),
            ignored.malformed(),
            ignored.duplicate()
        );
    }
    out
}
