use clap::ValueEnum;
use vox_correlation::{AggregationMode, AggregationWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliAggregationMode {
    Immediate,
    Aggregating,
}

impl From<CliAggregationMode> for AggregationMode {
    fn from(value: CliAggregationMode) -> Self {
        match value {
            CliAggregationMode::Immediate => AggregationMode::Immediate,
            CliAggregationMode::Aggregating => AggregationMode::Aggregating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliAggregationWindow {
    Fixed,
    Sliding,
}

impl From<CliAggregationWindow> for AggregationWindow {
    fn from(value: CliAggregationWindow) -> Self {
        match value {
            CliAggregationWindow::Fixed => AggregationWindow::Fixed,
            CliAggregationWindow::Sliding => AggregationWindow::Sliding,
        }
    }
}
