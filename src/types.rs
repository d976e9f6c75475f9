//! Plate data model
//!
//! `Plate` is the result entity built once per accepted detection. Callers only ever see one
//! of its projections: the compact result, the full result (with vertices) or the legacy dict.

use serde::{Deserialize, Serialize};

/// Four corner points, ordered top-left, top-right, bottom-right, bottom-left
pub type Vertex = [[i32; 2]; 4];

/// Axis-aligned box as `[x1, y1, x2, y2]` in source-image pixels
pub type BoundingBox = [i32; 4];

/// Plate category by color / jurisdiction / layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlateType {
    #[default]
    Unknown,
    Blue,
    YellowSingle,
    WhiteSingle,
    /// New-energy vehicles
    Green,
    BlackHkMacao,
    HkSingle,
    HkDouble,
    MacaoSingle,
    MacaoDouble,
    YellowDouble,
}

impl PlateType {
    /// Numeric code used by the model tooling (-1 for unknown)
    pub fn code(&self) -> i32 {
        match self {
            PlateType::Unknown => -1,
            PlateType::Blue => 0,
            PlateType::YellowSingle => 1,
            PlateType::WhiteSingle => 2,
            PlateType::Green => 3,
            PlateType::BlackHkMacao => 4,
            PlateType::HkSingle => 5,
            PlateType::HkDouble => 6,
            PlateType::MacaoSingle => 7,
            PlateType::MacaoDouble => 8,
            PlateType::YellowDouble => 9,
        }
    }

    /// Human readable label
    pub fn display_name(&self) -> &'static str {
        match self {
            PlateType::Unknown => "未知",
            PlateType::Blue => "蓝牌",
            PlateType::YellowSingle => "黄牌单层",
            PlateType::WhiteSingle => "白牌单层",
            PlateType::Green => "绿牌新能源",
            PlateType::BlackHkMacao => "黑牌港澳",
            PlateType::HkSingle => "香港单层",
            PlateType::HkDouble => "香港双层",
            PlateType::MacaoSingle => "澳门单层",
            PlateType::MacaoDouble => "澳门双层",
            PlateType::YellowDouble => "黄牌双层",
        }
    }
}

/// Text layout of a plate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerNum {
    /// Single row of characters
    #[default]
    Mono,
    /// Two stacked rows (short upper row, main lower row)
    Double,
}

impl LayerNum {
    /// Decode the detector's layer flag. Only `1` means double; everything else is mono.
    pub fn from_flag(flag: i32) -> Self {
        if flag == 1 {
            LayerNum::Double
        } else {
            LayerNum::Mono
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            LayerNum::Mono => 0,
            LayerNum::Double => 1,
        }
    }
}

/// A recognized license plate. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Plate {
    vertex: Vertex,
    bounding_box: BoundingBox,
    code: String,
    rec_confidence: f32,
    det_confidence: f32,
    plate_type: PlateType,
    layer_num: LayerNum,
}

impl Plate {
    pub fn new(
        vertex: Vertex,
        code: String,
        rec_confidence: f32,
        bounding_box: BoundingBox,
        det_confidence: f32,
        plate_type: PlateType,
        layer_num: LayerNum,
    ) -> Self {
        Self {
            vertex,
            bounding_box,
            code,
            rec_confidence,
            det_confidence,
            plate_type,
            layer_num,
        }
    }

    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    pub fn left_top(&self) -> [i32; 2] {
        self.vertex[0]
    }

    pub fn right_top(&self) -> [i32; 2] {
        self.vertex[1]
    }

    pub fn right_bottom(&self) -> [i32; 2] {
        self.vertex[2]
    }

    pub fn left_bottom(&self) -> [i32; 2] {
        self.vertex[3]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rec_confidence(&self) -> f32 {
        self.rec_confidence
    }

    pub fn det_confidence(&self) -> f32 {
        self.det_confidence
    }

    pub fn plate_type(&self) -> PlateType {
        self.plate_type
    }

    pub fn layer_num(&self) -> LayerNum {
        self.layer_num
    }

    /// Compact projection: code, confidence, type, box, layer
    pub fn to_result(&self) -> CompactResult {
        CompactResult {
            code: self.code.clone(),
            confidence: self.rec_confidence,
            plate_type: self.plate_type,
            bounding_box: self.bounding_box,
            layer: self.layer_num,
        }
    }

    /// Full projection: the compact fields plus the four vertices
    pub fn to_full_result(&self) -> FullResult {
        FullResult {
            code: self.code.clone(),
            confidence: self.rec_confidence,
            plate_type: self.plate_type,
            bounding_box: self.bounding_box,
            vertex: self.vertex,
            layer: self.layer_num,
        }
    }

    /// Dict projection used by the legacy pipeline
    pub fn to_dict(&self) -> PlateDict {
        PlateDict {
            plate_code: self.code.clone(),
            rec_confidence: self.rec_confidence,
            det_bound_box: self.bounding_box,
            plate_type: self.plate_type,
            layer_num: self.layer_num,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactResult {
    pub code: String,
    pub confidence: f32,
    pub plate_type: PlateType,
    pub bounding_box: BoundingBox,
    pub layer: LayerNum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullResult {
    pub code: String,
    pub confidence: f32,
    pub plate_type: PlateType,
    pub bounding_box: BoundingBox,
    pub vertex: Vertex,
    pub layer: LayerNum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateDict {
    pub plate_code: String,
    pub rec_confidence: f32,
    pub det_bound_box: BoundingBox,
    pub plate_type: PlateType,
    pub layer_num: LayerNum,
}

/// One entry of the pipeline output, in the shape selected at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlateResult {
    Full(FullResult),
    Compact(CompactResult),
}

impl PlateResult {
    pub fn code(&self) -> &str {
        match self {
            PlateResult::Compact(r) => &r.code,
            PlateResult::Full(r) => &r.code,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            PlateResult::Compact(r) => r.confidence,
            PlateResult::Full(r) => r.confidence,
        }
    }

    pub fn plate_type(&self) -> PlateType {
        match self {
            PlateResult::Compact(r) => r.plate_type,
            PlateResult::Full(r) => r.plate_type,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            PlateResult::Compact(r) => r.bounding_box,
            PlateResult::Full(r) => r.bounding_box,
        }
    }

    pub fn layer(&self) -> LayerNum {
        match self {
            PlateResult::Compact(r) => r.layer,
            PlateResult::Full(r) => r.layer,
        }
    }

    /// Vertices, only present in the full projection
    pub fn vertex(&self) -> Option<&Vertex> {
        match self {
            PlateResult::Compact(_) => None,
            PlateResult::Full(r) => Some(&r.vertex),
        }
    }
}
