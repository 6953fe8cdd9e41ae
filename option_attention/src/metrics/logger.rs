//! Training loggers for option-critic losses.
//!
//! Provides different logging backends for loss snapshots.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::losses::{LossKind, LossValues};
use crate::metrics::summaries::SummaryBundle;

/// Loss snapshot for logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossSnapshot {
    /// Training step.
    pub step: usize,
    /// Completed episodes.
    pub episode: usize,
    /// Loss terms.
    pub values: LossValues,
    /// Global gradient norm per loss kind.
    pub grad_norms: [Option<f32>; 5],
}

fn kind_index(kind: LossKind) -> usize {
    match kind {
        LossKind::SuccessorFeatures => 0,
        LossKind::Option => 1,
        LossKind::Critic => 2,
        LossKind::Termination => 3,
        LossKind::Direction => 4,
    }
}

impl LossSnapshot {
    pub fn new(step: usize, episode: usize) -> Self {
        Self {
            step,
            episode,
            ..Default::default()
        }
    }

    /// Set loss values.
    pub fn with_values(mut self, values: LossValues) -> Self {
        self.values = values;
        self
    }

    /// Set the gradient norm of one loss.
    pub fn with_grad_norm(mut self, kind: LossKind, norm: f32) -> Self {
        self.grad_norms[kind_index(kind)] = Some(norm);
        self
    }

    /// Take the scalars and gradient norm of a summary bundle.
    pub fn record(&mut self, bundle: &SummaryBundle) {
        for (tag, value) in &bundle.scalars {
            match *tag {
                "SF_loss" => self.values.sf = *value,
                "Entropy_loss" => self.values.entropy = *value,
                "Policy_loss" => self.values.policy = *value,
                "Mix_critic_loss" => self.values.mix_critic = *value,
                "Critic_loss" => self.values.critic = *value,
                "Term_loss" => self.values.term = *value,
                "Direction_loss" => self.values.direction = *value,
                _ => {}
            }
        }
        if bundle.kind == LossKind::Option {
            let v = &mut self.values;
            v.option = v.policy - v.entropy + v.mix_critic;
        }
        self.grad_norms[kind_index(bundle.kind)] = Some(bundle.global_grad_norm());
    }

    pub fn grad_norm(&self, kind: LossKind) -> Option<f32> {
        self.grad_norms[kind_index(kind)]
    }
}

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log a loss snapshot.
    fn log(&mut self, snapshot: &LossSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger with pretty formatting.
pub struct ConsoleLogger {
    log_interval: usize,
    last_log_step: usize,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a new console logger.
    ///
    /// # Arguments
    ///
    /// * `log_interval` - Steps between log entries
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval,
            last_log_step: 0,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }

    fn print_header(&self) {
        println!(
            "{:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "Step", "Episode", "SF", "Option", "Critic", "Term", "Direction", "Entropy", "Secs"
        );
        println!("{}", "-".repeat(92));
    }

    /// Whether `step` is due for logging.
    fn is_due(&self, step: usize) -> bool {
        step >= self.last_log_step + self.log_interval
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &LossSnapshot) {
        if !self.is_due(snapshot.step) {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let v = &snapshot.values;
        println!(
            "{:>8} {:>8} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>8.0}",
            snapshot.step,
            snapshot.episode,
            v.sf,
            v.option,
            v.critic,
            v.term,
            v.direction,
            v.entropy,
            self.start_time.elapsed().as_secs_f32()
        );

        self.last_log_step = snapshot.step;
    }

    fn flush(&mut self) {}
}

/// CSV header written by [`CSVLogger`].
pub const CSV_HEADER: &str = "step,episode,sf_loss,mix_critic_loss,critic_loss,term_loss,direction_loss,entropy_loss,policy_loss,option_loss,grad_norm_sf,grad_norm_option,grad_norm_critic,grad_norm_term,grad_norm_direction,elapsed_secs";

/// CSV file logger for analysis.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    /// Create a new CSV logger.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER)?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    /// Reset the start time.
    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, snapshot: &LossSnapshot) {
        let v = &snapshot.values;
        let norms: Vec<String> = snapshot
            .grad_norms
            .iter()
            .map(|n| n.map(|n| n.to_string()).unwrap_or_default())
            .collect();

        if let Err(e) = writeln!(
            self.writer,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{:.2}",
            snapshot.step,
            snapshot.episode,
            v.sf,
            v.mix_critic,
            v.critic,
            v.term,
            v.direction,
            v.entropy,
            v.policy,
            v.option,
            norms.join(","),
            self.start_time.elapsed().as_secs_f32()
        ) {
            log::warn!("Failed to write CSV metrics row: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Failed to flush CSV metrics: {}", e);
        }
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &LossSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_values() -> LossValues {
        LossValues {
            sf: 0.5,
            mix_critic: 0.1,
            critic: 0.3,
            term: -0.05,
            direction: 0.02,
            entropy: 0.01,
            policy: 0.2,
            option: 0.29,
        }
    }

    #[test]
    fn test_loss_snapshot() {
        let snapshot = LossSnapshot::new(100, 7)
            .with_values(sample_values())
            .with_grad_norm(LossKind::Critic, 1.5);

        assert_eq!(snapshot.step, 100);
        assert_eq!(snapshot.episode, 7);
        assert_eq!(snapshot.grad_norm(LossKind::Critic), Some(1.5));
        assert_eq!(snapshot.grad_norm(LossKind::SuccessorFeatures), None);
    }

    #[test]
    fn test_record_bundle() {
        let values = sample_values();
        let bundle = SummaryBundle {
            kind: LossKind::Option,
            activations: Vec::new(),
            scalars: crate::metrics::summaries::summarized_scalars(LossKind::Option, &values),
            grad_norms: Vec::new(),
        };

        let mut snapshot = LossSnapshot::new(1, 1);
        snapshot.record(&bundle);
        assert_eq!(snapshot.values.policy, 0.2);
        assert!((snapshot.values.option - 0.29).abs() < 1e-6);
        assert_eq!(snapshot.grad_norm(LossKind::Option), Some(0.0));
    }

    #[test]
    fn test_console_logger_interval() {
        let mut logger = ConsoleLogger::new(10);
        assert!(!logger.is_due(5));
        logger.log(&LossSnapshot::new(10, 1).with_values(sample_values()));
        assert!(!logger.is_due(15));
        assert!(logger.is_due(20));
    }

    #[test]
    fn test_csv_logger_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("losses.csv");

        {
            let mut logger = CSVLogger::new(&path).unwrap();
            logger.log(
                &LossSnapshot::new(1, 0)
                    .with_values(sample_values())
                    .with_grad_norm(LossKind::SuccessorFeatures, 2.0),
            );
        }

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER);

        let header_cols = lines[0].split(',').count();
        let row: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(row.len(), header_cols);
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "0.500000");
        assert_eq!(row[10], "2");
        assert_eq!(row[11], "");
    }

    #[test]
    fn test_multi_logger() {
        let dir = tempdir().unwrap();
        let csv = CSVLogger::new(dir.path().join("m.csv")).unwrap();
        let mut multi = MultiLogger::new().add(ConsoleLogger::new(1)).add(csv);
        assert_eq!(multi.len(), 2);

        multi.log(&LossSnapshot::new(1, 0));
        multi.flush();
    }
}
