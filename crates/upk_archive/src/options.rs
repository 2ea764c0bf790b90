//! Options controlling how an archive is parsed and patched

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use bon::Builder;

use crate::{error::Error, stream::Platform};

/// Game family an archive belongs to. Families tweak the header layout and table rules.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Family {
    #[default]
    Generic,

    /// Extra header fields keyed on the licensee version, LZMA compressed chunks, and no name
    /// flags on PS3
    MassEffect,

    /// Name flags are not validated
    Turok,
}

impl Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Generic => "generic",
            Family::MassEffect => "mass-effect",
            Family::Turok => "turok",
        })
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Family::Generic),
            "mass-effect" | "masseffect" => Ok(Family::MassEffect),
            "turok" => Ok(Family::Turok),
            _ => Err(Error::CustomError(format!("unknown family {s}"))),
        }
    }
}

/// Options for how an archive should be opened and patched
#[derive(Debug, Clone, Builder)]
pub struct ArchiveOptions {
    /// Platform the archive was cooked for, which decides its byte order
    #[builder(default)]
    pub platform: Platform,

    #[builder(default)]
    pub family: Family,

    /// Accept unknown name table flags with a warning instead of failing
    #[builder(default)]
    pub relaxed_name_flags: bool,

    /// Text embedded in the stamp written before injected payloads and over freed space
    #[builder(into, default = String::from("upk-rs"))]
    pub signature: String,

    /// Overwrite space released by [`Archive::replace_file`](crate::Archive::replace_file)
    /// with a marker
    #[builder(default = true)]
    pub stamp_freed_space: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::Result;
    use crate::options::{ArchiveOptions, Family};
    use crate::stream::Platform;

    #[test]
    fn builder_defaults() {
        let options = ArchiveOptions::default();
        assert_eq!(options.platform, Platform::Pc);
        assert_eq!(options.family, Family::Generic);
        assert!(!options.relaxed_name_flags);
        assert!(options.stamp_freed_space);
        assert_eq!(options.signature, "upk-rs");

        let options = ArchiveOptions::builder()
            .platform(Platform::Xbox)
            .signature("tester")
            .stamp_freed_space(false)
            .build();
        assert_eq!(options.platform, Platform::Xbox);
        assert_eq!(options.signature, "tester");
        assert!(!options.stamp_freed_space);
    }

    #[test]
    fn family_names() -> Result<()> {
        for family in [Family::Generic, Family::MassEffect, Family::Turok] {
            assert_eq!(family.to_string().parse::<Family>()?, family);
        }
        assert!("unreal".parse::<Family>().is_err());
        Ok(())
    }
}
