//! Helper functions for integration tests

use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use blackbox_prober::runner::{CommandOutput, CommandRunner};
use blackbox_prober::{Dispatcher, Exporter, RawConfiguration};
use parking_lot::Mutex;

/// Reads the value of `metric` for `address` from the text exposition
pub fn sample(text: &str, metric: &str, address: &str) -> Option<f64> {
    let address_label = format!("address=\"{address}\"");
    text.lines()
        .filter(|line| line.starts_with(&format!("{metric}{{")))
        .find(|line| line.contains(&address_label))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Build an exporter from a YAML configuration
pub fn exporter(yaml: &str, dispatcher: Dispatcher) -> Exporter {
    let raw: RawConfiguration = serde_yaml::from_str(yaml).unwrap();
    Exporter::from_raw_with(&raw, dispatcher).unwrap()
}

/// Run one pass and return the text exposition
pub async fn collect(exporter: &Exporter) -> String {
    exporter.collect_text().await.unwrap()
}

/// A local port nothing listens on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// One recorded invocation of a [`ScriptedRunner`]
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

/// Answers every command with the same output and records the calls
pub struct ScriptedRunner {
    output: CommandOutput,
    pub calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn succeeding(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            output: CommandOutput {
                code: Some(0),
                success: true,
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            },
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(code: i32, stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            output: CommandOutput {
                code: Some(code),
                success: false,
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            },
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> io::Result<CommandOutput> {
        self.calls.lock().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
        Ok(self.output.clone())
    }
}
