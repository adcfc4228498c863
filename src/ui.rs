//! Interface de terminal do pipeline — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`PipelineProgress`] acompanha visualmente
//! cada consulta de status feita pelo poller.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{StageDefinition, StageStatus, StatusReport};
use crate::poller::{PollObserver, PollOutcome, StageEvent};

/// Indicador visual de progresso de um pipeline no terminal.
///
/// Exibe um spinner durante a execução e mensagens coloridas para estágios
/// iniciados (ciano), concluídos (verde) e com falha (vermelho).
pub struct PipelineProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    cyan: Style,
    green: Style,
    red: Style,
    yellow: Style,
}

impl PipelineProgress {
    /// Inicia o spinner com o tema do pipeline.
    pub fn start(theme: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        // O template é fixo; se algum dia for inválido, fica o estilo padrão.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Starting pipeline: {theme}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            cyan: Style::new().cyan(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn print_event(&self, event: &StageEvent) {
        let line = match event {
            StageEvent::Started { id, title } => {
                format!("  {} [{id}] {title}", self.cyan.apply_to("▶"))
            }
            StageEvent::Completed { id, title } => {
                format!("  {} [{id}] {title}", self.green.apply_to("✓"))
            }
            StageEvent::Failed { id, title } => {
                format!("  {} [{id}] {title}", self.red.apply_to("✗"))
            }
        };
        self.pb.println(line);
    }
}

impl PollObserver for PipelineProgress {
    fn started(&mut self, pipeline_id: &str) {
        self.pb
            .println(format!("  Pipeline {}", self.yellow.apply_to(pipeline_id)));
        self.pb.set_message("Waiting for first status...");
    }

    fn report(&mut self, report: &StatusReport, events: &[StageEvent]) {
        for event in events {
            self.print_event(event);
        }
        let done = report
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        let current = report
            .stages
            .iter()
            .find(|s| s.status == StageStatus::Running)
            .map(|s| s.definition.subtitle.as_str())
            .unwrap_or("");
        self.pb
            .set_message(format!("{done}/{} stages {current}", report.stages.len()));
    }

    /// Finaliza o spinner e exibe o resultado final do pipeline.
    fn finished(&mut self, outcome: &PollOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            PollOutcome::Completed(_) => {
                println!(
                    "  {} Pipeline completed successfully 🎉",
                    self.green.apply_to("✓")
                );
            }
            PollOutcome::Failed(report) => {
                let stage = report
                    .stages
                    .iter()
                    .find(|s| s.status == StageStatus::Failed)
                    .map(|s| s.title().to_string())
                    .unwrap_or_default();
                println!("  {} Pipeline failed at {stage}", self.red.apply_to("✗"));
            }
            PollOutcome::TransportFailed(e) => {
                println!("  {} Lost contact with pipeline: {e}", self.red.apply_to("✗"));
            }
            PollOutcome::Abandoned => {
                println!("  {} Pipeline cancelled", self.yellow.apply_to("■"));
            }
        }
    }
}

/// Imprime um relatório de status como tabela simples, um estágio por linha.
pub fn print_report(report: &StatusReport) {
    let green = Style::new().green();
    let red = Style::new().red();
    let cyan = Style::new().cyan();
    let dim = Style::new().dim();

    for stage in &report.stages {
        let status = match stage.status {
            StageStatus::Pending => dim.apply_to(stage.status.to_string()),
            StageStatus::Running => cyan.apply_to(stage.status.to_string()),
            StageStatus::Completed => green.apply_to(stage.status.to_string()),
            StageStatus::Failed => red.apply_to(stage.status.to_string()),
        };
        println!("  {:<10} {}", status, stage.title());
    }
    println!(
        "  isComplete={} hasFailed={}",
        report.is_complete, report.has_failed
    );
}

/// Imprime as definições estáticas dos estágios com seus itens.
pub fn print_stages(definitions: &[StageDefinition]) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();

    for def in definitions {
        println!("{}: {}", bold.apply_to(&def.title), def.subtitle);
        for (label, items) in [
            ("in", &def.inputs),
            ("do", &def.actions),
            ("out", &def.outputs),
        ] {
            for item in items {
                match &item.service {
                    Some(service) => println!(
                        "  {label:<4}{} {}",
                        item.title,
                        dim.apply_to(format!("({service})"))
                    ),
                    None => println!("  {label:<4}{}", item.title),
                }
            }
        }
    }
}
