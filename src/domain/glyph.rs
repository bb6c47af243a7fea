/// Map legend: one character per grid cell.
/// Meaning is centralized here so the parser and the renderer agree.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Glyph {
    Empty,
    Wall,      // '#'
    Apple,     // 'o'
    PushBlock, // 'B'
    Portal,    // 'P'
    Start,     // 'S' (chain head)
    Follower(u8), // '1'..'9', ordered behind the head by digit
}

impl Glyph {
    pub fn from_char(ch: char) -> Glyph {
        match ch {
            '#' => Glyph::Wall,
            'o' => Glyph::Apple,
            'B' => Glyph::PushBlock,
            'P' => Glyph::Portal,
            'S' => Glyph::Start,
            '1'..='9' => Glyph::Follower(ch as u8 - b'0'),
            _ => Glyph::Empty,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Glyph::Empty => '.',
            Glyph::Wall => '#',
            Glyph::Apple => 'o',
            Glyph::PushBlock => 'B',
            Glyph::Portal => 'P',
            Glyph::Start => 'S',
            Glyph::Follower(n) => (b'0' + n) as char,
        }
    }
}

impl Default for Glyph {
    fn default() -> Self {
        Glyph::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legend_round_trips_markers() {
        for ch in ['#', 'o', 'B', 'P', 'S', '1', '9'] {
            assert_eq!(Glyph::from_char(ch).to_char(), ch);
        }
    }

    #[test]
    fn unknown_and_zero_are_empty() {
        assert_eq!(Glyph::from_char(' '), Glyph::Empty);
        assert_eq!(Glyph::from_char('.'), Glyph::Empty);
        assert_eq!(Glyph::from_char('0'), Glyph::Empty);
        assert_eq!(Glyph::from_char('x'), Glyph::Empty);
    }
}
