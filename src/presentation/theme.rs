use colored::Colorize;

pub struct Theme {
    pub title: fn(&str) -> String,
    pub label: fn(&str) -> String,
    pub value: fn(&str) -> String,
    pub good: fn(&str) -> String,
    pub bad: fn(&str) -> String,
    pub line: fn(&str) -> String,
}

impl Theme {
    pub fn new(enable_color: bool) -> Self {
        if enable_color {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    fn colored() -> Self {
        Self {
            title: |s| s.green().bold().to_string(),
            label: |s| s.cyan().to_string(),
            value: |s| s.white().to_string(),
            good: |s| s.bright_green().to_string(),
            bad: |s| s.red().to_string(),
            line: |s| s.bright_black().dimmed().to_string(),
        }
    }

    fn plain() -> Self {
        Self {
            title: |s| s.to_string(),
            label: |s| s.to_string(),
            value: |s| s.to_string(),
            good: |s| s.to_string(),
            bad: |s| s.to_string(),
            line: |s| s.to_string(),
        }
    }
}
