//! Control entity naming.
//!
//! Every managed light owns a handful of entities holding its settings and
//! bookkeeping, named `<platform>.motion_dimmer_<device>_[<segment>_]<suffix>`.

/// Lowercase, with every run of non-alphanumerics collapsed to `_` and no
/// leading or trailing `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Entity ids of one device's control entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlIds {
    device: String,
}

impl ControlIds {
    pub fn new(device: &str) -> Self {
        Self {
            device: slugify(device),
        }
    }

    fn id(&self, platform: &str, suffix: &str) -> String {
        format!("{}.motion_dimmer_{}_{}", platform, self.device, suffix)
    }

    pub fn disabled_until(&self) -> String {
        self.id("datetime", "disabled_until")
    }

    pub fn brightness_min(&self) -> String {
        self.id("number", "brightness_min")
    }

    pub fn trigger_interval(&self) -> String {
        self.id("number", "trigger_interval")
    }

    pub fn extension_max(&self) -> String {
        self.id("number", "extension_max")
    }

    pub fn manual_override(&self) -> String {
        self.id("number", "manual_override")
    }

    pub fn prediction_secs(&self) -> String {
        self.id("number", "prediction_secs")
    }

    pub fn prediction_brightness(&self) -> String {
        self.id("number", "prediction_brightness")
    }

    /// Automation on/off switch
    pub fn control(&self) -> String {
        self.id("switch", "control")
    }

    pub fn timer(&self) -> String {
        self.id("sensor", "timer")
    }

    /// Base duration of a segment
    pub fn segment_seconds(&self, segment: &str) -> String {
        self.id("number", &format!("{}_seconds", segment))
    }

    /// Target light of a segment. On means the segment is enabled.
    pub fn segment_light(&self, segment: &str) -> String {
        self.id("light", &format!("{}_light", segment))
    }

    /// Every control entity for the given segment slugs.
    pub fn all<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut ids = vec![
            self.disabled_until(),
            self.brightness_min(),
            self.trigger_interval(),
            self.extension_max(),
            self.manual_override(),
            self.prediction_secs(),
            self.prediction_brightness(),
            self.control(),
            self.timer(),
        ];
        for segment in segments {
            ids.push(self.segment_seconds(segment));
            ids.push(self.segment_light(segment));
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Day"), "day");
        assert_eq!(slugify("Late Night"), "late_night");
        assert_eq!(slugify("  Movie -- time! "), "movie_time");
        assert_eq!(slugify("Früh"), "früh");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn test_control_ids() {
        let ids = ControlIds::new("Hallway");
        assert_eq!(ids.disabled_until(), "datetime.motion_dimmer_hallway_disabled_until");
        assert_eq!(ids.brightness_min(), "number.motion_dimmer_hallway_brightness_min");
        assert_eq!(ids.control(), "switch.motion_dimmer_hallway_control");
        assert_eq!(ids.timer(), "sensor.motion_dimmer_hallway_timer");
        assert_eq!(
            ids.segment_seconds("late_night"),
            "number.motion_dimmer_hallway_late_night_seconds"
        );
        assert_eq!(
            ids.segment_light("day"),
            "light.motion_dimmer_hallway_day_light"
        );
        assert_eq!(ids.all(["day", "night"]).len(), 13);
    }
}
