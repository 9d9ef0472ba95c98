//! cliclack theme

use cliclack::ThemeState;
use console::Style;

/// Yellow while a prompt or spinner is live
#[derive(Debug, Clone, Default)]
pub struct KilnTheme;

fn by_state(state: &ThemeState, submitted: Style) -> Style {
    match state {
        ThemeState::Active => Style::new().yellow(),
        ThemeState::Error(_) => Style::new().red(),
        ThemeState::Cancel => Style::new().dim(),
        ThemeState::Submit => submitted,
    }
}

impl cliclack::Theme for KilnTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        by_state(state, Style::new().yellow().dim())
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        by_state(state, Style::new().green())
    }
}

pub fn init_theme() {
    cliclack::set_theme(KilnTheme);
}
