//! Standard Cubism parameter identifiers written by the controller.

pub const ANGLE_X: &str = "ParamAngleX";
pub const ANGLE_Y: &str = "ParamAngleY";
pub const ANGLE_Z: &str = "ParamAngleZ";
pub const BODY_ANGLE_X: &str = "ParamBodyAngleX";
pub const BODY_ANGLE_Y: &str = "ParamBodyAngleY";
pub const BODY_ANGLE_Z: &str = "ParamBodyAngleZ";
pub const BREATH: &str = "ParamBreath";
pub const EYE_BALL_X: &str = "ParamEyeBallX";
pub const EYE_BALL_Y: &str = "ParamEyeBallY";
pub const EYE_L_OPEN: &str = "ParamEyeLOpen";
pub const EYE_R_OPEN: &str = "ParamEyeROpen";
pub const MOUTH_OPEN_Y: &str = "ParamMouthOpenY";
/// Never written; mouth shape stays under motion/expression control.
pub const MOUTH_FORM: &str = "ParamMouthForm";
pub const BROW_L_Y: &str = "ParamBrowLY";
pub const BROW_R_Y: &str = "ParamBrowRY";
pub const EYE_SMILE: &str = "ParamEyeSmile";

/// Every id the pose, blink, micro and lip-sync writers may touch.
pub const ALL: [&str; 15] = [
    ANGLE_X,
    ANGLE_Y,
    ANGLE_Z,
    BODY_ANGLE_X,
    BODY_ANGLE_Y,
    BODY_ANGLE_Z,
    BREATH,
    EYE_BALL_X,
    EYE_BALL_Y,
    EYE_L_OPEN,
    EYE_R_OPEN,
    MOUTH_OPEN_Y,
    BROW_L_Y,
    BROW_R_Y,
    EYE_SMILE,
];
