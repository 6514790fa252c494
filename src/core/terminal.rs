use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "              _              _ _   ",
        "__      _____| |__   ___  __| | |_ ",
        "\\ \\ /\\ / / _ \\ '_ \\ / _ \\/ _` | __|",
        " \\ V  V /  __/ |_) |  __/ (_| | |_ ",
        "  \\_/\\_/ \\___|_.__/ \\___|\\__,_|\\__|",
    ];

    // Gradient: #818cf8 → #22d3ee (diagonal top-left → bottom-right)
    let stops: [(u8, u8, u8); 2] = [(129, 140, 248), (34, 211, 238)];
    let max_w = 35u32;
    let max_d = max_w + 4 * 10;

    println!();
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32 + y as u32 * 10) * 1000 / max_d).min(1000);
            let (r, g, b) = lerp_color(stops[0], stops[1], d);
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");
    println!();
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

/// Boxed help/status block used by the CLI. Collects lines, prints them
/// under a styled title.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, cmd: &str, desc: &str) -> Self {
        self.lines
            .push(format!("  {:<22} {}", style(cmd).cyan().bold(), desc));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(format!("  {} {}: {}", GEAR, style(label).bold().cyan(), value));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn info(mut self, text: &str) -> Self {
        self.lines
            .push(format!("  {} {}", INFO_ICON, style(text).blue()));
        self
    }

    pub fn warn(mut self, text: &str) -> Self {
        self.lines
            .push(format!("  {} {}", WARN_ICON, style(text).yellow()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(self) {
        println!("\n {}", style(self.title).bold().underlined());
        for line in self.lines {
            println!("{}", line);
        }
    }
}
