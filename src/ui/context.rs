//! Whether output may use spinners, bars and prompts

use std::io::IsTerminal;

/// Set by CI providers; any of them disables interactive output
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Forces plain output regardless of the terminal
pub const NON_INTERACTIVE_VAR: &str = "KILN_NON_INTERACTIVE";

#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
    auto_yes: bool,
}

impl UiContext {
    /// Interactive only on a terminal outside CI
    pub fn detect() -> Self {
        let on_terminal = std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        let forced_plain = std::env::var_os(NON_INTERACTIVE_VAR).is_some()
            || CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self {
            interactive: on_terminal && !forced_plain,
            auto_yes: false,
        }
    }

    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    /// Treat every confirmation as answered yes
    pub fn with_auto_yes(self, auto_yes: bool) -> Self {
        Self { auto_yes, ..self }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}
