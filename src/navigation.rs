//! Turn-by-turn steps shown and read aloud by the client.
//!
//! The steps are fixed demo data for a walk from Raffles Place MRT to Chulia
//! Street; only the spoken wording is computed.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Depart,
    Straight,
    TurnLeft,
    TurnRight,
    Cross,
    Arrive,
}

impl Maneuver {
    fn phrase(self) -> &'static str {
        match self {
            Maneuver::Depart => "Start walking",
            Maneuver::Straight => "Continue straight",
            Maneuver::TurnLeft => "Turn left",
            Maneuver::TurnRight => "Turn right",
            Maneuver::Cross => "Cross the road",
            Maneuver::Arrive => "You have arrived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub maneuver: Maneuver,
    pub instruction: String,
    pub distance_m: u32,
}

impl Step {
    fn new(maneuver: Maneuver, instruction: &str, distance_m: u32) -> Self {
        Self {
            maneuver,
            instruction: instruction.to_string(),
            distance_m,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnouncedStep {
    pub number: usize,
    pub total: usize,
    #[serde(flatten)]
    pub step: Step,
    pub speech: String,
}

pub fn demo_steps() -> Vec<Step> {
    vec![
        Step::new(Maneuver::Depart, "Exit Raffles Place MRT at Exit H", 0),
        Step::new(Maneuver::Straight, "Walk along Raffles Place", 95),
        Step::new(Maneuver::Cross, "Use the pedestrian crossing at Chulia Street", 20),
        Step::new(Maneuver::TurnLeft, "Turn left onto Chulia Street", 185),
        Step::new(Maneuver::Arrive, "Chulia Street is on your right", 80),
    ]
}

/// Spoken distances are rounded for listening: tens of metres below one
/// kilometre, tenths of a kilometre above.
fn spoken_distance(distance_m: u32) -> String {
    let rounded = (distance_m.saturating_add(5) / 10 * 10).max(10);
    if rounded >= 1000 {
        let km = (rounded as f64 / 100.0).round() / 10.0;
        if km == 1.0 {
            String::from("1 kilometre")
        } else {
            format!("{} kilometres", km)
        }
    } else {
        format!("{} metres", rounded)
    }
}

/// `index` is zero based.
pub fn announcement(step: &Step, index: usize, total: usize) -> String {
    let position = format!("Step {} of {}.", index + 1, total);
    match step.maneuver {
        Maneuver::Arrive => format!(
            "{} {} at your destination. {}.",
            position,
            step.maneuver.phrase(),
            step.instruction
        ),
        _ if step.distance_m == 0 => format!(
            "{} {}. {}.",
            position,
            step.maneuver.phrase(),
            step.instruction
        ),
        _ => format!(
            "{} {} in {}. {}.",
            position,
            step.maneuver.phrase(),
            spoken_distance(step.distance_m),
            step.instruction
        ),
    }
}

pub fn announced_steps(steps: &[Step]) -> Vec<AnnouncedStep> {
    let total = steps.len();
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| AnnouncedStep {
            number: index + 1,
            total,
            step: step.clone(),
            speech: announcement(step, index, total),
        })
        .collect()
}
