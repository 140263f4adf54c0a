// MIT License
// Copyright 2023--present optirpc developers

//! Spectrum templates, shared by sources through `spectrum_guid`.

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Spectrum {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<SpectrumDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumDefinition {
    /// Single wavelength in nanometers.
    Monochromatic { wavelength: f64 },
    /// Temperature in kelvin.
    Blackbody { temperature: f64 },
    Sampled {
        wavelengths: Vec<f64>,
        values: Vec<f64>,
    },
    Library { file_uri: String },
    Predefined(PredefinedSpectrum),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredefinedSpectrum {
    Incandescent,
    WarmWhiteFluorescent,
    DaylightFluorescent,
    WhiteLed,
    Halogen,
    MetalHalide,
    HighPressureSodium,
}

impl Spectrum {
    pub fn monochromatic(name: impl Into<String>, wavelength: f64) -> Self {
        Self::with(name, SpectrumDefinition::Monochromatic { wavelength })
    }

    pub fn blackbody(name: impl Into<String>, temperature: f64) -> Self {
        Self::with(name, SpectrumDefinition::Blackbody { temperature })
    }

    pub fn sampled(name: impl Into<String>, wavelengths: Vec<f64>, values: Vec<f64>) -> Self {
        Self::with(
            name,
            SpectrumDefinition::Sampled {
                wavelengths,
                values,
            },
        )
    }

    pub fn predefined(name: impl Into<String>, which: PredefinedSpectrum) -> Self {
        Self::with(name, SpectrumDefinition::Predefined(which))
    }

    fn with(name: impl Into<String>, definition: SpectrumDefinition) -> Self {
        Self {
            name: name.into(),
            definition: Some(definition),
            ..Default::default()
        }
    }
}
