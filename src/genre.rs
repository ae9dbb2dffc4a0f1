use crate::fingerprint::AudioFingerprint;

/// Broad genre label detected from spectral shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedGenre {
    Electronic,
    Rock,
    Classical,
    HipHop,
    Unknown,
}

impl DetectedGenre {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Electronic => "electronic",
            Self::Rock => "rock",
            Self::Classical => "classical",
            Self::HipHop => "hip-hop",
            Self::Unknown => "unknown",
        }
    }
}

/// Free-text tags belonging to the electronic family.
const ELECTRONIC_FAMILY: &[&str] = &[
    "house", "techno", "edm", "trance", "electro", "electronic", "dance", "dubstep",
    "drum and bass", "drum & bass", "dnb", "garage", "breakbeat", "hardstyle",
];

const ROCK_FAMILY: &[&str] = &[
    "rock", "indie", "punk", "metal", "alternative", "grunge", "hardcore",
];

const CLASSICAL_FAMILY: &[&str] = &[
    "classical", "orchestral", "symphony", "baroque", "chamber", "opera", "piano",
];

const HIPHOP_FAMILY: &[&str] = &[
    "hip-hop", "hip hop", "hiphop", "rap", "trap", "r&b", "rnb", "grime",
];

const FAMILIES: &[(DetectedGenre, &[&str])] = &[
    (DetectedGenre::Electronic, ELECTRONIC_FAMILY),
    (DetectedGenre::Rock, ROCK_FAMILY),
    (DetectedGenre::Classical, CLASSICAL_FAMILY),
    (DetectedGenre::HipHop, HIPHOP_FAMILY),
];

/// Classify the observed audio from its spectral-shape ratios.
/// Tiered: first match wins.
pub fn detect(fingerprint: &AudioFingerprint) -> DetectedGenre {
    let brightness = fingerprint.energy.brightness;
    let spread = fingerprint.energy.spread;
    let high_freq = fingerprint.energy.high_freq;

    // Dark, narrow spectrum: orchestral/acoustic material
    if brightness < 0.10 && spread < 0.45 {
        return DetectedGenre::Classical;
    }
    // Bass-weighted with an early rolloff
    if brightness < 0.16 && high_freq < 0.35 {
        return DetectedGenre::HipHop;
    }
    // Bright, wide, sustained high end: synthesized material
    if brightness > 0.28 && spread > 0.55 && high_freq > 0.5 {
        return DetectedGenre::Electronic;
    }
    // Mid-bright with broad band energy: amplified band material
    if (0.14..=0.30).contains(&brightness) && spread > 0.40 {
        return DetectedGenre::Rock;
    }
    DetectedGenre::Unknown
}

/// Family membership of a free-text genre tag (case-insensitive substring
/// match). None when the tag belongs to no known family.
pub fn family_of(tag: &str) -> Option<DetectedGenre> {
    let tag = tag.to_lowercase();
    for (family, members) in FAMILIES {
        if members.iter().any(|member| tag.contains(member)) {
            return Some(*family);
        }
    }
    None
}

/// True when the detected label and the declared tag cannot belong to the
/// same family. A missing or unrecognized tag is neutrally compatible, as is
/// an Unknown detection.
pub fn incompatible(detected: DetectedGenre, declared: Option<&str>) -> bool {
    if detected == DetectedGenre::Unknown {
        return false;
    }
    let Some(tag) = declared else {
        return false;
    };
    match family_of(tag) {
        Some(family) => family != detected,
        None => false,
    }
}

/// Spectral-axis score for a compatible candidate: how strongly the observed
/// ratios match the detected family's expected signature. Tiers: strong 0.9,
/// moderate 0.7, weak 0.5. A neutral comparison — Unknown detection, or a
/// declared tag that is missing or belongs to no known family — scores 0.5.
pub fn signature_score(
    detected: DetectedGenre,
    declared: Option<&str>,
    fingerprint: &AudioFingerprint,
) -> f64 {
    if declared.and_then(family_of).is_none() {
        return 0.5;
    }
    let brightness = fingerprint.energy.brightness;
    let spread = fingerprint.energy.spread;
    let high_freq = fingerprint.energy.high_freq;

    match detected {
        DetectedGenre::Electronic => {
            if brightness > 0.35 && high_freq > 0.60 {
                0.9
            } else if brightness > 0.30 {
                0.7
            } else {
                0.5
            }
        }
        DetectedGenre::Rock => {
            if spread > 0.55 && (0.16..=0.28).contains(&brightness) {
                0.9
            } else if spread > 0.45 {
                0.7
            } else {
                0.5
            }
        }
        DetectedGenre::Classical => {
            if brightness < 0.06 && spread < 0.35 {
                0.9
            } else if brightness < 0.09 {
                0.7
            } else {
                0.5
            }
        }
        DetectedGenre::HipHop => {
            if high_freq < 0.25 && brightness < 0.12 {
                0.9
            } else if high_freq < 0.32 {
                0.7
            } else {
                0.5
            }
        }
        DetectedGenre::Unknown => 0.5,
    }
}
