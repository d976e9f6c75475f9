//! Domain constants and model file layout

/// Double-layer plates are split at this fraction of the rectified height: the top band holds
/// the short upper row, the bottom band the main row.
pub const DOUBLE_LAYER_SPLIT_RATIO: f32 = 0.4;

/// Shortest plate code that is accepted as a result
pub const MIN_PLATE_CODE_LEN: usize = 7;

/// Legacy pipeline: the alignment window is the detection box enlarged by this factor
pub const ALIGN_SCALE_FACTOR: f32 = 1.2;

/// Legacy pipeline: side length of the aligned patch fed to the vertex predictor
pub const ALIGN_SIZE: u32 = 96;

/// Rectified crops at least this much taller than wide are rotated upright
pub const ROTATE_ASPECT_THRESHOLD: f32 = 1.5;

/// Number of fields in a multi-task detector row
pub const DETECTION_ROW_FIELDS: usize = 14;

/// Model release the file layout below belongs to
pub const MODEL_VERSION: &str = "20230229";

/// Remote host serving the model files
pub const MODEL_REMOTE_URL: &str = "http://hyperlpr.tunm.top/raw/";

pub const DETECTOR_320_FILE: &str = "y5fu_320x_sim.onnx";
pub const DETECTOR_640_FILE: &str = "y5fu_640x_sim.onnx";
pub const RECOGNIZER_FILE: &str = "rpv3_mdict_160_r3.onnx";
pub const CLASSIFIER_FILE: &str = "litemodel_cls_96x_r1.onnx";

/// Recognizer input (height, width)
pub const REC_INPUT_SIZE: (u32, u32) = (48, 160);

/// Classifier input (height, width)
pub const CLS_INPUT_SIZE: (u32, u32) = (96, 96);

/// Multi-task detector score threshold
pub const DET_CONF_THRESHOLD: f32 = 0.5;

/// Multi-task detector NMS IoU threshold
pub const DET_NMS_THRESHOLD: f32 = 0.5;
