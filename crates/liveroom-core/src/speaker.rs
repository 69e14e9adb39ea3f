/// Default audible threshold on the 0..=100 volume scale.
pub const AUDIBLE_THRESHOLD: u32 = 5;

/// One entry of a periodic volume report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLevel {
    pub uid: String,
    /// 0..=100
    pub level: u32,
}

impl VolumeLevel {
    pub fn new(uid: impl Into<String>, level: u32) -> Self {
        Self {
            uid: uid.into(),
            level,
        }
    }
}

/// Pick the single loudest participant strictly above `threshold`.
///
/// On a tie the first reported entry wins.
pub fn select_active_speaker(levels: &[VolumeLevel], threshold: u32) -> Option<String> {
    let loudest = levels
        .iter()
        .fold(None::<&VolumeLevel>, |max, current| match max {
            Some(max) if current.level <= max.level => Some(max),
            _ => Some(current),
        })?;
    (loudest.level > threshold).then(|| loudest.uid.clone())
}
