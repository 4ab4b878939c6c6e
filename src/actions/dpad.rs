use super::{node_key, Action, ActionRef, Node, TextWriter};
use crate::controller::{Source, STICK_PAD_MAX};
use crate::mapper::Mapper;
use crate::output::HapticData;

/// Fraction of a region's span a position may drift past its border before
/// the dpad leaves that region
pub const REGION_HYSTERESIS: f64 = 0.08;
/// Normalized deflection below which the dpad rests in the center
pub const DPAD_MIN_MAGNITUDE: f64 = 0.3;

const UP: usize = 0;
const DOWN: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Section {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    #[default]
    Center,
}

impl Section {
    /// Indices into `[up, down, left, right]` held in this section
    fn directions(self) -> &'static [usize] {
        match self {
            Section::North => &[UP],
            Section::NorthEast => &[UP, RIGHT],
            Section::East => &[RIGHT],
            Section::SouthEast => &[DOWN, RIGHT],
            Section::South => &[DOWN],
            Section::SouthWest => &[DOWN, LEFT],
            Section::West => &[LEFT],
            Section::NorthWest => &[UP, LEFT],
            Section::Center => &[],
        }
    }
}

/// Angular slice of the stick/pad plane
#[derive(Clone, Copy, Debug)]
pub struct Region {
    pub min_angle: f64,
    pub max_angle: f64,
    pub min_magnitude: f64,
    pub section: Section,
}

pub const ALL_REGIONS: [Region; 8] = [
    Region::new(0.0, 45.0, Section::North),
    Region::new(45.0, 90.0, Section::NorthEast),
    Region::new(90.0, 135.0, Section::East),
    Region::new(135.0, 180.0, Section::SouthEast),
    Region::new(180.0, 225.0, Section::South),
    Region::new(225.0, 270.0, Section::SouthWest),
    Region::new(270.0, 315.0, Section::West),
    Region::new(315.0, 360.0, Section::NorthWest),
];

impl Region {
    pub const fn new(min_angle: f64, max_angle: f64, section: Section) -> Self {
        Self {
            min_angle,
            max_angle,
            min_magnitude: DPAD_MIN_MAGNITUDE,
            section,
        }
    }

    /// Section for a normalized position. The previous section is kept while
    /// the position stays within its widened borders.
    pub fn section_at(x: f64, y: f64, previous: Section) -> Section {
        let (angle, magnitude) = Region::to_polar(x, y);
        if let Some(region) = ALL_REGIONS.iter().find(|r| r.section == previous) {
            if region.contains_outer(angle, magnitude) {
                return previous;
            }
        }
        ALL_REGIONS
            .iter()
            .find(|r| r.contains(angle, magnitude))
            .map_or(Section::Center, |r| r.section)
    }

    /// Angle in degrees clockwise, 0 at the start of the north slice
    fn to_polar(x: f64, y: f64) -> (f64, f64) {
        let angle_deg = y.atan2(x).to_degrees();
        let magnitude = x.hypot(y).min(1.0);
        ((112.5 - angle_deg).rem_euclid(360.0), magnitude)
    }

    fn within(angle: f64, from: f64, to: f64) -> bool {
        (angle - from).rem_euclid(360.0) <= to - from
    }

    pub fn contains(&self, angle: f64, magnitude: f64) -> bool {
        angle >= self.min_angle && angle < self.max_angle && magnitude >= self.min_magnitude
    }

    pub fn contains_outer(&self, angle: f64, magnitude: f64) -> bool {
        let angle_hysteresis = (self.max_angle - self.min_angle) * REGION_HYSTERESIS;
        let magnitude_hysteresis = (1.0 - self.min_magnitude) * REGION_HYSTERESIS;
        Region::within(
            angle,
            self.min_angle - angle_hysteresis,
            self.max_angle + angle_hysteresis,
        ) && magnitude >= self.min_magnitude - magnitude_hysteresis
    }
}

#[derive(Debug, Default)]
pub(crate) struct DPadState {
    section: Section,
}

/// `dpad(up[, down[, left[, right]]])` turns a two-axis input into up to
/// two held directions; diagonals hold both neighbours.
#[derive(Debug, Clone)]
pub struct DPadAction {
    pub actions: [ActionRef; 4],
    pub haptic: Option<HapticData>,
}

impl DPadAction {
    pub fn new(actions: [ActionRef; 4]) -> Self {
        Self {
            actions,
            haptic: None,
        }
    }
}

impl Node for DPadAction {
    fn on_pair(&self, this: &ActionRef, m: &mut Mapper, x: f64, y: f64, _what: Source) {
        let full = STICK_PAD_MAX as f64;
        let state = m.runtime.dpads.entry(node_key(this)).or_default();
        let old = state.section;
        let new = Region::section_at(x / full, y / full, old);
        if new == old {
            return;
        }
        state.section = new;
        for index in old.directions() {
            if !new.directions().contains(index) {
                self.actions[*index].on_button(m, false);
            }
        }
        for index in new.directions() {
            if !old.directions().contains(index) {
                self.actions[*index].on_button(m, true);
            }
        }
        if new != Section::Center {
            if let Some(haptic) = self.haptic {
                m.feedback(haptic);
            }
        }
    }

    fn write_text(&self, w: &mut TextWriter) {
        let used = self
            .actions
            .iter()
            .rposition(|a| !a.is_none())
            .map_or(1, |last| last + 1);
        w.open("dpad");
        for (i, action) in self.actions[..used].iter().enumerate() {
            if i > 0 {
                w.sep();
            }
            w.action(action);
        }
        w.close();
    }

    fn describe(&self) -> String {
        "DPad".to_owned()
    }

    fn children(&self) -> Vec<&ActionRef> {
        self.actions.iter().collect()
    }

    fn compress(&self, _this: &ActionRef) -> ActionRef {
        Action::DPad(Self {
            actions: self.actions.clone().map(|a| a.compress()),
            haptic: self.haptic,
        })
        .into_ref()
    }

    fn with_haptic(&self, _this: &ActionRef, haptic: HapticData) -> ActionRef {
        Action::DPad(Self {
            haptic: Some(haptic),
            ..self.clone()
        })
        .into_ref()
    }

    fn haptic(&self) -> Option<HapticData> {
        self.haptic
    }
}
