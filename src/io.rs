//! Line-oriented textual formats for configurations and actions.
//!
//! A configuration is a block of `M <id> <alpha> <beta> <gamma>` and
//! `E <id1> <side1> <dock1> <ori> <dock2> <side2> <id2>` records terminated
//! by a blank line; a file may hold many blocks. Sides, docks and
//! orientations accept their names (`A`, `+X`, `N`, ...) or their numeric
//! codes. Actions use `R <id> <joint> <angle>`, `C <edge>` and `D <edge>`
//! records. Camera and color side-channel records belong to the visualization
//! tooling and are not understood here.

use std::{fmt::Write as _, io::BufRead, str::SplitWhitespace};

use enum_map::Enum;
use thiserror::Error;

use crate::{
    action::{Action, Reconnect, Rotate},
    configuration::Configuration,
    edge::{Dock, Edge, Ori},
    module::{Joint, ModuleId, Side},
};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected side (A, B), got {0:?}")]
    BadSide(String),
    #[error("expected dock (+X, -X, -Z), got {0:?}")]
    BadDock(String),
    #[error("expected orientation (N, E, S, W), got {0:?}")]
    BadOri(String),
    #[error("expected joint index (0, 1, 2), got {0:?}")]
    BadJoint(String),
    #[error("expected record tag M or E, got {0:?}")]
    BadRecord(String),
    #[error("expected action tag R, C or D, got {0:?}")]
    BadActionRecord(String),
    #[error("malformed number {0:?}")]
    BadNumber(String),
    #[error("record is missing fields")]
    MissingField,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const SIDE_NAMES: [&str; 2] = ["A", "B"];
const DOCK_NAMES: [&str; 3] = ["+X", "-X", "-Z"];
const ORI_NAMES: [&str; 4] = ["N", "E", "S", "W"];

fn parse_token<T: Enum + Copy>(
    token: &str,
    names: &[&str],
    err: fn(String) -> ParseError,
) -> Result<T, ParseError> {
    for (i, name) in names.iter().enumerate() {
        if token == *name || token == i.to_string() {
            return Ok(T::from_usize(i));
        }
    }
    Err(err(token.to_string()))
}

pub fn parse_side(token: &str) -> Result<Side, ParseError> {
    parse_token(token, &SIDE_NAMES, ParseError::BadSide)
}

pub fn parse_dock(token: &str) -> Result<Dock, ParseError> {
    parse_token(token, &DOCK_NAMES, ParseError::BadDock)
}

pub fn parse_ori(token: &str) -> Result<Ori, ParseError> {
    parse_token(token, &ORI_NAMES, ParseError::BadOri)
}

fn parse_joint(token: &str) -> Result<Joint, ParseError> {
    match token {
        "0" => Ok(Joint::Alpha),
        "1" => Ok(Joint::Beta),
        "2" => Ok(Joint::Gamma),
        other => Err(ParseError::BadJoint(other.to_string())),
    }
}

fn next_field<'a>(fields: &mut SplitWhitespace<'a>) -> Result<&'a str, ParseError> {
    fields.next().ok_or(ParseError::MissingField)
}

fn parse_number<T: std::str::FromStr>(token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::BadNumber(token.to_string()))
}

fn parse_edge(fields: &mut SplitWhitespace<'_>) -> Result<Edge, ParseError> {
    let id1: ModuleId = parse_number(next_field(fields)?)?;
    let side1 = parse_side(next_field(fields)?)?;
    let dock1 = parse_dock(next_field(fields)?)?;
    let ori = parse_ori(next_field(fields)?)?;
    let dock2 = parse_dock(next_field(fields)?)?;
    let side2 = parse_side(next_field(fields)?)?;
    let id2: ModuleId = parse_number(next_field(fields)?)?;
    Ok(Edge::new(id1, side1, dock1, ori, dock2, side2, id2))
}

/// Reads one blank-line-terminated configuration block; `Ok(None)` when the
/// stream starts with a blank line or is exhausted.
pub fn read_configuration(
    input: &mut impl BufRead,
) -> Result<Option<Configuration>, ParseError> {
    let mut cfg = Configuration::new();
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        let mut fields = line.split_whitespace();
        match next_field(&mut fields)? {
            "M" => {
                let id: ModuleId = parse_number(next_field(&mut fields)?)?;
                let alpha: f64 = parse_number(next_field(&mut fields)?)?;
                let beta: f64 = parse_number(next_field(&mut fields)?)?;
                let gamma: f64 = parse_number(next_field(&mut fields)?)?;
                cfg.add_module(alpha, beta, gamma, id);
            }
            "E" => {
                cfg.add_edge(parse_edge(&mut fields)?);
            }
            other => return Err(ParseError::BadRecord(other.to_string())),
        }
    }
    Ok(if cfg.is_empty() { None } else { Some(cfg) })
}

pub fn read_configurations(input: &mut impl BufRead) -> Result<Vec<Configuration>, ParseError> {
    let mut configs = Vec::new();
    while let Some(cfg) = read_configuration(input)? {
        configs.push(cfg);
    }
    Ok(configs)
}

/// Reads one blank-line-terminated block of `R`/`C`/`D` records.
pub fn read_action(input: &mut impl BufRead) -> Result<Action, ParseError> {
    let mut rotations = Vec::new();
    let mut reconnections = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        let mut fields = line.split_whitespace();
        match next_field(&mut fields)? {
            "R" => {
                let id: ModuleId = parse_number(next_field(&mut fields)?)?;
                let joint = parse_joint(next_field(&mut fields)?)?;
                let angle: f64 = parse_number(next_field(&mut fields)?)?;
                rotations.push(Rotate::new(id, joint, angle));
            }
            tag @ ("C" | "D") => {
                let edge = parse_edge(&mut fields)?;
                reconnections.push(Reconnect { add: tag == "C", edge });
            }
            other => return Err(ParseError::BadActionRecord(other.to_string())),
        }
    }
    Ok(Action::new(rotations, reconnections))
}

pub fn write_edge(edge: &Edge) -> String {
    format!(
        "{} {} {} {} {} {} {}",
        edge.id1,
        SIDE_NAMES[edge.side1.index()],
        DOCK_NAMES[edge.dock1 as usize],
        ORI_NAMES[edge.ori as usize],
        DOCK_NAMES[edge.dock2 as usize],
        SIDE_NAMES[edge.side2.index()],
        edge.id2,
    )
}

/// One `M` record per module and one canonical-direction `E` record per
/// edge.
pub fn write_configuration(cfg: &Configuration) -> String {
    let mut out = String::new();
    for (id, module) in cfg.modules() {
        let _ = writeln!(
            out,
            "M {id} {} {} {}",
            module.joint(Joint::Alpha),
            module.joint(Joint::Beta),
            module.joint(Joint::Gamma),
        );
    }
    for slots in cfg.edges().values() {
        for edge in slots.iter().flatten() {
            if edge.id1 < edge.id2 {
                let _ = writeln!(out, "E {}", write_edge(edge));
            }
        }
    }
    out
}

/// Configuration blocks separated by blank lines.
pub fn write_path(path: &[Configuration]) -> String {
    let mut out = String::new();
    for cfg in path {
        out.push_str(&write_configuration(cfg));
        out.push('\n');
    }
    out
}

pub fn write_action(action: &Action) -> String {
    let mut out = String::new();
    for rot in action.rotations() {
        let _ = writeln!(out, "R {} {} {}", rot.id, rot.joint as usize, rot.angle);
    }
    for rec in action.reconnections() {
        let _ = writeln!(out, "{} {}", if rec.add { "C" } else { "D" }, write_edge(&rec.edge));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use assertables::{assert_contains, assert_len_eq_x};

    use super::*;

    fn sample() -> Configuration {
        let mut cfg = Configuration::new();
        cfg.add_module(90.0, -45.0, 180.0, 0);
        cfg.add_module(0.0, 0.0, 0.0, 1);
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::A,
            Dock::XPlus,
            Ori::East,
            Dock::ZMinus,
            Side::B,
            1
        )));
        cfg
    }

    #[test]
    fn configuration_roundtrip() {
        let cfg = sample();
        let text = write_configuration(&cfg);
        assert_contains!(text, "M 0 90 -45 180\n");
        assert_contains!(text, "E 0 A +X E -Z B 1\n");

        let mut reader = BufReader::new(text.as_bytes());
        let parsed = read_configuration(&mut reader).unwrap().expect("non-empty block");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn numeric_tokens_are_accepted() {
        let text = "M 0 0 0 0\nM 1 0 0 0\nE 0 0 0 1 2 1 1\n";
        let mut reader = BufReader::new(text.as_bytes());
        let parsed = read_configuration(&mut reader).unwrap().expect("non-empty block");
        let edge = parsed.edges_of(0)[0];
        assert_eq!(edge.side1, Side::A);
        assert_eq!(edge.dock1, Dock::XPlus);
        assert_eq!(edge.ori, Ori::East);
        assert_eq!(edge.dock2, Dock::ZMinus);
        assert_eq!(edge.side2, Side::B);
    }

    #[test]
    fn multiple_blocks_parse_to_multiple_configurations() {
        let text = format!(
            "{}\n{}\n",
            write_configuration(&sample()),
            write_configuration(&sample())
        );
        let mut reader = BufReader::new(text.as_bytes());
        let configs = read_configurations(&mut reader).unwrap();
        assert_len_eq_x!(&configs, 2);
        assert_eq!(configs[0], configs[1]);
    }

    #[test]
    fn unknown_record_tag_is_an_error() {
        let mut reader = BufReader::new("X 1 2 3\n".as_bytes());
        let err = read_configuration(&mut reader).unwrap_err();
        assert!(matches!(err, ParseError::BadRecord(tag) if tag == "X"));
    }

    #[test]
    fn bad_field_values_are_errors() {
        let mut reader = BufReader::new("E 0 A +Y N -Z B 1\n".as_bytes());
        assert!(matches!(
            read_configuration(&mut reader).unwrap_err(),
            ParseError::BadDock(_)
        ));

        let mut reader = BufReader::new("M zero 0 0 0\n".as_bytes());
        assert!(matches!(
            read_configuration(&mut reader).unwrap_err(),
            ParseError::BadNumber(_)
        ));

        let mut reader = BufReader::new("E 0 A +X N -Z B\n".as_bytes());
        assert!(matches!(
            read_configuration(&mut reader).unwrap_err(),
            ParseError::MissingField
        ));
    }

    #[test]
    fn action_roundtrip() {
        let action = Action::new(
            vec![Rotate::new(3, Joint::Gamma, -90.0)],
            vec![Reconnect::split(Edge::new(
                0,
                Side::B,
                Dock::XMinus,
                Ori::West,
                Dock::ZMinus,
                Side::A,
                4,
            ))],
        );
        let text = write_action(&action);
        assert_contains!(text, "R 3 2 -90\n");
        assert_contains!(text, "D 0 B -X W -Z A 4\n");

        let mut reader = BufReader::new(text.as_bytes());
        let parsed = read_action(&mut reader).unwrap();
        assert_eq!(parsed, action);
    }
}
