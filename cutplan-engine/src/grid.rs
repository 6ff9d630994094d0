use std::fmt;
use std::str::FromStr;

use cutplan_core::document::{Color, Document};
use cutplan_core::geometry::Point2;

/// 定位标记所在图层。
pub const REGISTRATION_LAYER: &str = "REGISTRO";
/// 定位标记方框边长（毫米）。
pub const REGISTRATION_MARK_SIDE: f64 = 17.0;
/// 单个标签的物理尺寸（毫米）。
pub const LABEL_WIDTH: f64 = 130.0;
pub const LABEL_HEIGHT: f64 = 190.0;

const SLOTS_18_X: [f64; 6] = [99.5, 253.0, 406.5, 560.0, 713.5, 867.0];
const SLOTS_18_Y: [f64; 3] = [113.9, 311.7, 509.5];
const CORNERS_18: [(f64, f64); 4] = [(8.5, 8.5), (961.5, 8.5), (8.5, 771.5), (961.5, 771.5)];

const SLOTS_32_X: [f64; 8] = [
    112.75, 266.25, 419.75, 573.25, 726.75, 880.25, 1033.75, 1187.25,
];
const SLOTS_32_Y: [f64; 4] = [241.95, 439.75, 637.55, 835.95];
const CORNERS_32: [(f64, f64); 4] = [(8.5, 8.5), (1291.5, 8.5), (8.5, 891.5), (1291.5, 891.5)];

/// 机台规格：18 位（970×780 mm）或 32 位（1300×900 mm）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GridVariant {
    #[default]
    Slots18,
    Slots32,
}

impl GridVariant {
    #[inline]
    pub fn capacity(self) -> usize {
        match self {
            GridVariant::Slots18 => 18,
            GridVariant::Slots32 => 32,
        }
    }

    /// 板材尺寸（宽, 高），单位毫米。
    #[inline]
    pub fn sheet_size(self) -> (f64, f64) {
        match self {
            GridVariant::Slots18 => (970.0, 780.0),
            GridVariant::Slots32 => (1300.0, 900.0),
        }
    }

    pub fn from_capacity(capacity: usize) -> Option<Self> {
        match capacity {
            18 => Some(GridVariant::Slots18),
            32 => Some(GridVariant::Slots32),
            _ => None,
        }
    }
}

impl fmt::Display for GridVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.capacity())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownGridVariant(pub String);

impl fmt::Display for UnknownGridVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown grid size {:?} (expected 18 or 32)", self.0)
    }
}

impl std::error::Error for UnknownGridVariant {}

impl FromStr for GridVariant {
    type Err = UnknownGridVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(GridVariant::from_capacity)
            .ok_or_else(|| UnknownGridVariant(value.to_string()))
    }
}

/// 角部定位标记：以角点为中心的闭合方框。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationMark {
    pub center: Point2,
    pub side: f64,
    pub color: Color,
}

impl RegistrationMark {
    /// 逆时针四个顶点，自左下角开始。
    pub fn outline(&self) -> [Point2; 4] {
        let h = self.side / 2.0;
        let (x, y) = (self.center.x(), self.center.y());
        [
            Point2::new(x - h, y - h),
            Point2::new(x + h, y - h),
            Point2::new(x + h, y + h),
            Point2::new(x - h, y + h),
        ]
    }
}

/// 固定的标签位坐标表，按行优先排列，1 号位在左下角。
#[derive(Debug, Clone)]
pub struct Grid {
    variant: GridVariant,
    slots: Vec<Point2>,
    corners: [Point2; 4],
}

impl Grid {
    pub fn new(variant: GridVariant) -> Self {
        let (xs, ys, corners): (&[f64], &[f64], [(f64, f64); 4]) = match variant {
            GridVariant::Slots18 => (SLOTS_18_X.as_slice(), SLOTS_18_Y.as_slice(), CORNERS_18),
            GridVariant::Slots32 => (SLOTS_32_X.as_slice(), SLOTS_32_Y.as_slice(), CORNERS_32),
        };
        let slots = ys
            .iter()
            .flat_map(|&y| xs.iter().map(move |&x| Point2::new(x, y)))
            .collect();
        Self {
            variant,
            slots,
            corners: corners.map(|(x, y)| Point2::new(x, y)),
        }
    }

    #[inline]
    pub fn variant(&self) -> GridVariant {
        self.variant
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn sheet_size(&self) -> (f64, f64) {
        self.variant.sheet_size()
    }

    /// 1 起始的标签位坐标，越界返回 `None`。
    pub fn slot_coordinate(&self, slot: usize) -> Option<Point2> {
        slot.checked_sub(1)
            .and_then(|index| self.slots.get(index))
            .copied()
    }

    /// 与 `slot_coordinate` 相同，但越界时回退到原点。
    pub fn coordinate_for(&self, slot: usize) -> Point2 {
        self.slot_coordinate(slot).unwrap_or(Point2::ORIGIN)
    }

    #[inline]
    pub fn contains_slot(&self, slot: usize) -> bool {
        (1..=self.capacity()).contains(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = (usize, Point2)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, point)| (index + 1, *point))
    }

    #[inline]
    pub fn corners(&self) -> [Point2; 4] {
        self.corners
    }

    pub fn registration_marks(&self) -> [RegistrationMark; 4] {
        self.corners.map(|center| RegistrationMark {
            center,
            side: REGISTRATION_MARK_SIDE,
            color: Color::YELLOW,
        })
    }

    /// 在模型空间绘制四个角部定位标记。
    pub fn draw_registration_marks(&self, document: &mut Document) {
        for mark in self.registration_marks() {
            document.add_polyline(mark.outline(), true, REGISTRATION_LAYER, mark.color);
        }
    }
}
