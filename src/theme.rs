use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub muted: Color,
  pub accent: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  /// Query terms inside the subtitle line.
  pub hit: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "Pastel",
    bg: Color::Rgb(30, 30, 46),
    fg: Color::Rgb(205, 214, 244),
    muted: Color::Rgb(127, 132, 156),
    accent: Color::Rgb(245, 194, 231),
    border: Color::Rgb(88, 91, 112),
    highlight_fg: Color::Rgb(30, 30, 46),
    highlight_bg: Color::Rgb(180, 190, 254),
    stripe_bg: Color::Rgb(36, 36, 54),
    hit: Color::Rgb(249, 226, 175),
    status: Color::Rgb(137, 220, 235),
    error: Color::Rgb(243, 139, 168),
    key_fg: Color::Rgb(30, 30, 46),
    key_bg: Color::Rgb(166, 173, 200),
  },
  Theme {
    name: "Dusk",
    bg: Color::Rgb(26, 27, 38),
    fg: Color::Rgb(192, 202, 245),
    muted: Color::Rgb(86, 95, 137),
    accent: Color::Rgb(122, 162, 247),
    border: Color::Rgb(59, 66, 97),
    highlight_fg: Color::Rgb(26, 27, 38),
    highlight_bg: Color::Rgb(187, 154, 247),
    stripe_bg: Color::Rgb(31, 35, 53),
    hit: Color::Rgb(224, 175, 104),
    status: Color::Rgb(125, 207, 255),
    error: Color::Rgb(247, 118, 142),
    key_fg: Color::Rgb(26, 27, 38),
    key_bg: Color::Rgb(169, 177, 214),
  },
  Theme {
    name: "Paper",
    bg: Color::Rgb(250, 244, 237),
    fg: Color::Rgb(87, 82, 121),
    muted: Color::Rgb(152, 147, 165),
    accent: Color::Rgb(180, 99, 122),
    border: Color::Rgb(206, 202, 205),
    highlight_fg: Color::Rgb(250, 244, 237),
    highlight_bg: Color::Rgb(40, 105, 131),
    stripe_bg: Color::Rgb(242, 233, 225),
    hit: Color::Rgb(234, 157, 52),
    status: Color::Rgb(86, 148, 159),
    error: Color::Rgb(180, 99, 122),
    key_fg: Color::Rgb(250, 244, 237),
    key_bg: Color::Rgb(121, 117, 147),
  },
];

pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}
