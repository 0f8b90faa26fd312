//! Filepath: src/infra/term.rs
//! Small terminal helpers: yes/no confirmation and elapsed-time display.

use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Ask a yes/no question on stdout, reading the answer from stdin.
/// Empty input takes `default`; EOF counts as "no".
pub fn confirm(prompt: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    print!("{prompt} {hint}: ");
    let _ = io::stdout().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => match line.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        },
    }
}

/// Format an elapsed duration as `1d 2h 3m 4.56s`, omitting leading zero
/// units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let days = (total / 86_400.0) as u64;
    let hours = ((total % 86_400.0) / 3_600.0) as u64;
    let minutes = ((total % 3_600.0) / 60.0) as u64;
    let seconds = total % 60.0;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 || days > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || hours > 0 || days > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds:.2}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_omits_leading_zero_units() {
        assert_eq!(format_elapsed(Duration::from_millis(4_560)), "4.56s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 5.00s");
        assert_eq!(format_elapsed(Duration::from_secs(3_600)), "1h 0m 0.00s");
        assert_eq!(
            format_elapsed(Duration::from_secs(90_061)),
            "1d 1h 1m 1.00s"
        );
    }
}
