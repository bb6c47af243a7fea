/// Pure grid rules: coordinates, entities, support and move validation.
/// Nothing here knows about timing or the terminal.

pub mod cell;
pub mod entity;
pub mod glyph;
pub mod rules;
pub mod support;
