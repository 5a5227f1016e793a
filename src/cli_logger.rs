use anyhow::Result;
use qprof::{Phase, SessionReport};

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_session_report(&self, report: &SessionReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }

        let mut out = String::new();
        out.push_str(&format!(
            "{} {}\n",
            self.style("qprof", "36;1"),
            self.style("OK", "32;1")
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("session", "90"),
            report.session_id
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("archive", "90"),
            report.archive_path.display()
        ));
        out.push_str(&format!(
            "{} {} in {}ms\n",
            self.style("queries", "90"),
            report.stats.executions,
            report.stats.elapsed_ms
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("entries", "90"),
            report.entries.len()
        ));
        for entry in &report.entries {
            out.push_str(&format!("  - {entry}\n"));
        }

        if !report.skipped.is_empty() {
            out.push_str(&format!("{}\n", self.style("skipped", "33;1")));
            for skipped in &report.skipped {
                let phase = match skipped.phase {
                    Phase::Base => "base",
                    Phase::Concurrent => "concurrent",
                    Phase::Final => "final",
                };
                out.push_str(&format!("  - [{phase}] {}\n", skipped.kind));
            }
        }

        println!("{}", out.trim_end());
        if report.short_run {
            self.print_warning(
                "queries ran for less than a minute; the CPU profile may be under-sampled",
            );
        }
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    pub fn print_warning(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "warning",
                "code": "warning",
                "message": msg,
            });
            eprintln!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("warn", "33;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}
