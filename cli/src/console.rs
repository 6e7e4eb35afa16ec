//! Interactive menu loop: pick a probe, answer its prompts, print and save the result.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use colored::*;
use futures::FutureExt;
use log::{error, info};

use sectoolbox_core::{enrich, InputBundle, InputKind, InputSpec, Probe, ProbeOutput, ResultStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Csv,
    Json,
}

impl SaveFormat {
    /// `csv` or `json` (any case); anything else means do not save.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "csv" => Some(SaveFormat::Csv),
            "json" => Some(SaveFormat::Json),
            _ => None,
        }
    }
}

pub struct Console<R, W> {
    input: R,
    output: W,
    store: ResultStore,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W, store: ResultStore) -> Self {
        Self { input, output, store }
    }

    /// Runs until the operator picks `0` or input ends.
    pub async fn run(&mut self, probes: &[Arc<dyn Probe>]) -> io::Result<()> {
        loop {
            self.render_menu(probes)?;
            write!(self.output, "\nSelect a probe (number): ")?;
            self.output.flush()?;

            let Some(choice) = self.read_line()? else {
                info!("Input closed, exiting.");
                return Ok(());
            };
            let choice = choice.trim();
            if choice == "0" {
                info!("Exiting.");
                return Ok(());
            }

            let selected = match choice.parse::<usize>() {
                Ok(n) if n >= 1 && n <= probes.len() => Arc::clone(&probes[n - 1]),
                _ => {
                    writeln!(self.output, "{}", "Invalid choice.".red())?;
                    continue;
                }
            };

            writeln!(
                self.output,
                "\nRunning: {} — {}\n",
                selected.name().bold(),
                selected.description()
            )?;

            let Some(inputs) = self.collect_inputs(&selected.requires())? else {
                info!("Input closed, exiting.");
                return Ok(());
            };

            if !self.execute(selected.as_ref(), &inputs).await? {
                return Ok(());
            }
        }
    }

    fn render_menu(&mut self, probes: &[Arc<dyn Probe>]) -> io::Result<()> {
        writeln!(self.output, "\n{}", "=== Available probes ===".bright_cyan().bold())?;
        for (i, probe) in probes.iter().enumerate() {
            writeln!(self.output, "{}) {} — {}", i + 1, probe.name(), probe.description())?;
        }
        writeln!(self.output, "0) Exit")
    }

    /// One line without its terminator, `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }

    /// Lines up to the first blank one (or end of input), joined with `\n`.
    fn read_block(&mut self) -> io::Result<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    fn collect_inputs(&mut self, specs: &[InputSpec]) -> io::Result<Option<InputBundle>> {
        let mut inputs = InputBundle::new();
        for spec in specs {
            match spec.kind {
                InputKind::Line => {
                    write!(self.output, "{}", spec.prompt)?;
                    self.output.flush()?;
                    let Some(value) = self.read_line()? else {
                        return Ok(None);
                    };
                    inputs.insert(spec.key, value.trim());
                }
                InputKind::Block => {
                    writeln!(self.output, "\n{}", spec.prompt)?;
                    self.output.flush()?;
                    let block = self.read_block()?;
                    inputs.insert(spec.key, block);
                }
            }
        }
        Ok(Some(inputs))
    }

    /// Runs one probe. Returns `false` when input ended during the save prompt.
    async fn execute(&mut self, probe: &dyn Probe, inputs: &InputBundle) -> io::Result<bool> {
        let started = Instant::now();
        let result = match AssertUnwindSafe(probe.run(inputs)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Probe '{}' failed: {:?}", probe.name(), e);
                return Ok(true);
            }
            Err(payload) => {
                error!("Probe '{}' panicked: {}", probe.name(), panic_message(payload.as_ref()));
                return Ok(true);
            }
        };

        let enriched = enrich(probe.name(), &result, started);
        self.print_result(&enriched)?;

        write!(self.output, "\nSave result as CSV, JSON or skip? (csv/json/N): ")?;
        self.output.flush()?;
        let Some(answer) = self.read_line()? else {
            return Ok(false);
        };

        let saved = match SaveFormat::from_answer(&answer) {
            Some(SaveFormat::Csv) => self.store.save_csv(probe.name(), &enriched),
            Some(SaveFormat::Json) => self.store.save_json(probe.name(), &enriched),
            None => return Ok(true),
        };
        match saved {
            Ok(path) => writeln!(
                self.output,
                "{}",
                format!("Result saved to: {}", path.display()).green()
            )?,
            Err(e) => error!("Failed to save result: {:#}", e),
        }
        Ok(true)
    }

    fn print_result(&mut self, result: &ProbeOutput) -> io::Result<()> {
        match serde_json::to_string_pretty(result) {
            Ok(json) => writeln!(self.output, "{}", json),
            Err(_) => writeln!(self.output, "{:?}", result),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Cursor;

    /// Echoes its inputs back, fails when `target` is "boom" and panics when it is "panic".
    struct EchoProbe;

    #[async_trait]
    impl Probe for EchoProbe {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes inputs"
        }

        fn requires(&self) -> Vec<InputSpec> {
            vec![
                InputSpec::line("target", "Target: "),
                InputSpec::block("headers", "Headers:"),
            ]
        }

        async fn run(&self, inputs: &InputBundle) -> anyhow::Result<ProbeOutput> {
            if inputs.text("target") == "boom" {
                anyhow::bail!("unexpected defect");
            }
            if inputs.text("target") == "panic" {
                panic!("echo blew up");
            }
            let mut out = ProbeOutput::new();
            out.insert("target".into(), inputs.text("target").into());
            out.insert("headers".into(), inputs.raw("headers").unwrap_or("").into());
            Ok(out)
        }
    }

    async fn drive(script: &str, dir: &std::path::Path) -> String {
        colored::control::set_override(false);
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(EchoProbe)];
        let mut output = Vec::new();
        let mut console = Console::new(Cursor::new(script.to_string()), &mut output, ResultStore::new(dir));
        console.run(&probes).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_save_format_answers() {
        assert_eq!(SaveFormat::from_answer(" CSV "), Some(SaveFormat::Csv));
        assert_eq!(SaveFormat::from_answer("json"), Some(SaveFormat::Json));
        assert_eq!(SaveFormat::from_answer(""), None);
        assert_eq!(SaveFormat::from_answer("n"), None);
    }

    #[tokio::test]
    async fn test_menu_and_invalid_choices() {
        let dir = tempfile::tempdir().unwrap();
        let out = drive("7\nabc\n0\n", dir.path()).await;
        assert!(out.contains("1) echo — Echoes inputs"));
        assert!(out.contains("0) Exit"));
        assert_eq!(out.matches("Invalid choice.").count(), 2);
    }

    #[tokio::test]
    async fn test_run_collects_block_and_saves_json() {
        let dir = tempfile::tempdir().unwrap();
        let out = drive("1\nhttp://x\nA: 1\nB: 2\n\njson\n0\n", dir.path()).await;

        assert!(out.contains("\"headers\": \"A: 1\\nB: 2\""));
        assert!(out.contains("\"test_name\": \"echo\""));
        assert!(out.contains("Result saved to:"));
        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_defect_keeps_loop_alive() {
        let dir = tempfile::tempdir().unwrap();
        let out = drive("1\nboom\n\n1\nok\n\nn\n0\n", dir.path()).await;
        assert!(out.contains("\"target\": \"ok\""));
        assert_eq!(out.matches("=== Available probes ===").count(), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_probe_panic_keeps_loop_alive() {
        let dir = tempfile::tempdir().unwrap();
        let out = drive("1\npanic\n\n1\nok\n\nn\n0\n", dir.path()).await;
        assert!(out.contains("\"target\": \"ok\""));
        assert_eq!(out.matches("=== Available probes ===").count(), 3);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_eof_exits_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let out = drive("1\nhttp://x\n", dir.path()).await;
        assert!(out.contains("Headers:"));
    }
}
