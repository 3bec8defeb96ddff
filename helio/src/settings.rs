// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! XML serialization of processing settings.
//!
//! Unknown elements are ignored; elements missing from a file leave the
//! corresponding current settings untouched. Floating-point values are
//! written with 4-digit precision, booleans as `"true"` / `"false"`.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};
use crate::pipeline::ProcessingSettings;
use crate::proc::lr::LucyRichardsonSettings;
use crate::proc::tcurve::{DEFAULT_LUT_SIZE, ToneCurve};
use crate::proc::unsharp::UnsharpMaskParams;

const ROOT: &str = "helio";
const LUCY_RICHARDSON: &str = "lucy-richardson";
const LR_SIGMA: &str = "sigma";
const LR_ITERS: &str = "iterations";
const LR_DERINGING: &str = "deringing";
const UNSH_MASK: &str = "unsharp_mask";
const UNSH_ADAPTIVE: &str = "adaptive";
const UNSH_SIGMA: &str = "sigma";
const UNSH_AMOUNT_MIN: &str = "amount_min";
const UNSH_AMOUNT_MAX: &str = "amount_max";
const UNSH_THRESHOLD: &str = "amount_threshold";
const UNSH_WIDTH: &str = "amount_width";
const TCURVE: &str = "tone_curve";
const TC_SMOOTH: &str = "smooth";
const TC_IS_GAMMA: &str = "is_gamma";
const TC_GAMMA: &str = "gamma";
const NORMALIZATION: &str = "normalization";
const NORM_ENABLED: &str = "enabled";
const NORM_MIN: &str = "min";
const NORM_MAX: &str = "max";

const TRUE_STR: &str = "true";
const FALSE_STR: &str = "false";

fn fmt_f32(v: f32) -> String {
    format!("{v:.4}")
}

fn bool_str(v: bool) -> &'static str {
    if v { TRUE_STR } else { FALSE_STR }
}

/// Which groups of settings a file actually carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadedSettings {
    pub lucy_richardson: bool,
    pub unsharp_masking: bool,
    pub tone_curve: bool,
}

pub fn settings_to_xml(settings: &ProcessingSettings) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;

    let mut lr = BytesStart::new(LUCY_RICHARDSON);
    lr.push_attribute((LR_SIGMA, fmt_f32(settings.lucy_richardson.sigma).as_str()));
    lr.push_attribute((LR_ITERS, settings.lucy_richardson.iterations.to_string().as_str()));
    lr.push_attribute((LR_DERINGING, bool_str(settings.lucy_richardson.deringing.enabled)));
    writer.write_event(Event::Empty(lr))?;

    for pass in &settings.unsharp_masking {
        let mut um = BytesStart::new(UNSH_MASK);
        um.push_attribute((UNSH_ADAPTIVE, bool_str(pass.adaptive)));
        um.push_attribute((UNSH_SIGMA, fmt_f32(pass.sigma).as_str()));
        um.push_attribute((UNSH_AMOUNT_MIN, fmt_f32(pass.amount_min).as_str()));
        um.push_attribute((UNSH_AMOUNT_MAX, fmt_f32(pass.amount_max).as_str()));
        um.push_attribute((UNSH_THRESHOLD, fmt_f32(pass.threshold).as_str()));
        um.push_attribute((UNSH_WIDTH, fmt_f32(pass.width).as_str()));
        writer.write_event(Event::Empty(um))?;
    }

    let tc = &settings.tone_curve;
    let mut tcel = BytesStart::new(TCURVE);
    tcel.push_attribute((TC_SMOOTH, bool_str(tc.smooth())));
    tcel.push_attribute((TC_IS_GAMMA, bool_str(tc.is_gamma_mode())));
    if tc.is_gamma_mode() {
        tcel.push_attribute((TC_GAMMA, fmt_f32(tc.gamma()).as_str()));
    }
    writer.write_event(Event::Start(tcel))?;
    let mut points = String::new();
    for &(x, y) in tc.points() {
        points.push_str(&fmt_f32(x));
        points.push(';');
        points.push_str(&fmt_f32(y));
        points.push(';');
    }
    writer.write_event(Event::Text(BytesText::new(&points)))?;
    writer.write_event(Event::End(BytesEnd::new(TCURVE)))?;

    let mut norm = BytesStart::new(NORMALIZATION);
    norm.push_attribute((NORM_ENABLED, bool_str(settings.normalization.enabled)));
    norm.push_attribute((NORM_MIN, fmt_f32(settings.normalization.min).as_str()));
    norm.push_attribute((NORM_MAX, fmt_f32(settings.normalization.max).as_str()));
    writer.write_event(Event::Empty(norm))?;

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::SettingsParse(e.to_string()))
}

/// Saves processing settings to `path`.
pub fn save_settings(path: &Path, settings: &ProcessingSettings) -> Result<()> {
    let xml = settings_to_xml(settings)?;
    std::fs::write(path, xml)?;
    Ok(())
}

fn parse_f32(s: &str) -> Result<f32> {
    s.trim()
        .parse::<f32>()
        .map_err(|_| Error::SettingsParse(format!("invalid number: {s:?}")))
}

fn parse_u32(s: &str) -> Result<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| Error::SettingsParse(format!("invalid integer: {s:?}")))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        TRUE_STR => Ok(true),
        FALSE_STR => Ok(false),
        other => Err(Error::SettingsParse(format!("invalid boolean: {other:?}"))),
    }
}

struct Attrs {
    pairs: Vec<(String, String)>,
}

impl Attrs {
    fn of(el: &BytesStart) -> Result<Attrs> {
        let mut pairs = Vec::new();
        for attr in el.attributes() {
            let attr = attr.map_err(|e| Error::SettingsParse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::SettingsParse(e.to_string()))?
                .into_owned();
            pairs.push((key, value));
        }
        Ok(Attrs { pairs })
    }

    fn get(&self, key: &str) -> Result<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| Error::SettingsParse(format!("missing attribute {key:?}")))
    }
}

fn parse_lucy_richardson(el: &BytesStart, out: &mut LucyRichardsonSettings) -> Result<()> {
    let attrs = Attrs::of(el)?;
    out.sigma = parse_f32(attrs.get(LR_SIGMA)?)?;
    out.iterations = parse_u32(attrs.get(LR_ITERS)?)?;
    out.deringing.enabled = parse_bool(attrs.get(LR_DERINGING)?)?;
    Ok(())
}

fn parse_unsharp_mask(el: &BytesStart) -> Result<UnsharpMaskParams> {
    let attrs = Attrs::of(el)?;
    Ok(UnsharpMaskParams {
        adaptive: parse_bool(attrs.get(UNSH_ADAPTIVE)?)?,
        sigma: parse_f32(attrs.get(UNSH_SIGMA)?)?,
        amount_min: parse_f32(attrs.get(UNSH_AMOUNT_MIN)?)?,
        amount_max: parse_f32(attrs.get(UNSH_AMOUNT_MAX)?)?,
        threshold: parse_f32(attrs.get(UNSH_THRESHOLD)?)?,
        width: parse_f32(attrs.get(UNSH_WIDTH)?)?,
    })
}

fn parse_flat_element(
    el: &BytesStart,
    settings: &mut ProcessingSettings,
    unsharp_passes: &mut Vec<UnsharpMaskParams>,
    loaded: &mut LoadedSettings,
) -> Result<()> {
    match el.name().as_ref() {
        b"lucy-richardson" => {
            parse_lucy_richardson(el, &mut settings.lucy_richardson)?;
            loaded.lucy_richardson = true;
        }
        b"unsharp_mask" => {
            unsharp_passes.push(parse_unsharp_mask(el)?);
            loaded.unsharp_masking = true;
        }
        b"normalization" => {
            let attrs = Attrs::of(el)?;
            settings.normalization.enabled = parse_bool(attrs.get(NORM_ENABLED)?)?;
            settings.normalization.min = parse_f32(attrs.get(NORM_MIN)?)?;
            settings.normalization.max = parse_f32(attrs.get(NORM_MAX)?)?;
        }
        _ => {} // unknown elements are ignored
    }
    Ok(())
}

fn parse_tone_curve_points(text: &str, curve: &mut ToneCurve) -> Result<()> {
    let values: Vec<f32> = text
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_f32)
        .collect::<Result<_>>()?;
    if values.len() < 4 || values.len() % 2 != 0 {
        return Err(Error::SettingsParse(
            "tone curve needs at least two points".into(),
        ));
    }
    curve.clear_points();
    for xy in values.chunks(2) {
        curve.add_point(xy[0], xy[1]);
    }
    Ok(())
}

/// Parses settings from an XML string, updating only the groups present.
pub fn settings_from_xml(xml: &str, settings: &mut ProcessingSettings) -> Result<LoadedSettings> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut loaded = LoadedSettings::default();
    let mut unsharp_passes: Vec<UnsharpMaskParams> = Vec::new();

    // Flags with no element in the file revert to their defaults.
    settings.lucy_richardson.deringing.enabled = false;
    settings.normalization.enabled = false;

    let mut in_tone_curve = false;
    let mut pending_curve: Option<ToneCurve> = None;

    loop {
        match reader.read_event()? {
            Event::Start(el) => {
                if el.name().as_ref() == b"tone_curve" {
                    let attrs = Attrs::of(&el)?;
                    let mut curve = ToneCurve::default();
                    curve.set_smooth(parse_bool(attrs.get(TC_SMOOTH)?)?);
                    if parse_bool(attrs.get(TC_IS_GAMMA)?)? {
                        curve.set_gamma(parse_f32(attrs.get(TC_GAMMA)?)?);
                        curve.set_gamma_mode(true);
                    }
                    in_tone_curve = true;
                    pending_curve = Some(curve);
                } else {
                    parse_flat_element(&el, settings, &mut unsharp_passes, &mut loaded)?;
                }
            }
            Event::Empty(el) => {
                if el.name().as_ref() == b"tone_curve" {
                    return Err(Error::SettingsParse(
                        "tone curve needs at least two points".into(),
                    ));
                }
                parse_flat_element(&el, settings, &mut unsharp_passes, &mut loaded)?;
            }
            Event::Text(text) => {
                if in_tone_curve {
                    let text = text
                        .decode()
                        .map_err(|e| Error::SettingsParse(e.to_string()))?;
                    let text = quick_xml::escape::unescape(&text)
                        .map_err(|e| Error::SettingsParse(e.to_string()))?;
                    if let Some(curve) = pending_curve.as_mut() {
                        let gamma_mode = curve.is_gamma_mode();
                        parse_tone_curve_points(&text, curve)?;
                        // add_point() drops gamma mode; restore it.
                        curve.set_gamma_mode(gamma_mode);
                    }
                }
            }
            Event::End(el) => {
                if el.name().as_ref() == b"tone_curve" {
                    in_tone_curve = false;
                    if let Some(mut curve) = pending_curve.take() {
                        curve.calculate_spline();
                        curve.refresh_lut(DEFAULT_LUT_SIZE);
                        settings.tone_curve = curve;
                        loaded.tone_curve = true;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !unsharp_passes.is_empty() {
        settings.unsharp_masking = unsharp_passes;
    }

    Ok(loaded)
}

/// Loads settings from `path`, updating only the groups present in the file.
pub fn load_settings(path: &Path, settings: &mut ProcessingSettings) -> Result<LoadedSettings> {
    let xml = std::fs::read_to_string(path)?;
    settings_from_xml(&xml, settings)
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::proc::lr::DeringingSettings;

    fn sample_settings() -> ProcessingSettings {
        let mut s = ProcessingSettings::new();
        s.lucy_richardson = LucyRichardsonSettings {
            sigma: 1.7,
            iterations: 42,
            deringing: DeringingSettings {
                enabled: true,
                ..Default::default()
            },
        };
        s.unsharp_masking = vec![
            UnsharpMaskParams {
                adaptive: false,
                sigma: 1.2,
                amount_min: 1.0,
                amount_max: 1.8,
                threshold: 0.1,
                width: 0.05,
            },
            UnsharpMaskParams {
                adaptive: true,
                sigma: 3.0,
                amount_min: 0.9,
                amount_max: 2.5,
                threshold: 0.4,
                width: 0.2,
            },
        ];
        s.tone_curve.add_point(0.25, 0.6);
        s.tone_curve.set_smooth(true);
        s.normalization.enabled = true;
        s.normalization.min = 0.05;
        s.normalization.max = 0.95;
        s
    }

    #[test]
    fn roundtrip_preserves_settings() {
        let original = sample_settings();
        let xml = settings_to_xml(&original).unwrap();

        let mut restored = ProcessingSettings::new();
        let loaded = settings_from_xml(&xml, &mut restored).unwrap();

        assert!(loaded.lucy_richardson && loaded.unsharp_masking && loaded.tone_curve);
        assert_eq!(restored.lucy_richardson.iterations, 42);
        assert!((restored.lucy_richardson.sigma - 1.7).abs() < 1e-4);
        assert!(restored.lucy_richardson.deringing.enabled);
        assert_eq!(restored.unsharp_masking.len(), 2);
        assert!(restored.unsharp_masking[1].adaptive);
        assert!((restored.unsharp_masking[1].threshold - 0.4).abs() < 1e-4);
        assert_eq!(restored.tone_curve.num_points(), 3);
        assert!(restored.tone_curve.smooth());
        let (x, y) = restored.tone_curve.point(1);
        assert!((x - 0.25).abs() < 1e-4 && (y - 0.6).abs() < 1e-4);
        assert!(restored.normalization.enabled);
        assert!((restored.normalization.min - 0.05).abs() < 1e-4);
    }

    #[test]
    fn gamma_curve_roundtrip() {
        let mut s = ProcessingSettings::new();
        s.tone_curve.set_gamma(2.2);
        s.tone_curve.set_gamma_mode(true);
        let xml = settings_to_xml(&s).unwrap();

        let mut restored = ProcessingSettings::new();
        settings_from_xml(&xml, &mut restored).unwrap();
        assert!(restored.tone_curve.is_gamma_mode());
        assert!((restored.tone_curve.gamma() - 2.2).abs() < 1e-4);
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let xml = r#"<?xml version="1.0"?>
            <helio>
              <future_feature answer="42"/>
              <lucy-richardson sigma="2.0000" iterations="10" deringing="false"/>
            </helio>"#;
        let mut s = ProcessingSettings::new();
        let loaded = settings_from_xml(xml, &mut s).unwrap();
        assert!(loaded.lucy_richardson);
        assert_eq!(s.lucy_richardson.iterations, 10);
    }

    #[test]
    fn missing_elements_leave_settings_untouched() {
        let xml = r#"<helio><lucy-richardson sigma="0.5000" iterations="3" deringing="false"/></helio>"#;
        let mut s = sample_settings();
        let loaded = settings_from_xml(xml, &mut s).unwrap();
        assert!(!loaded.unsharp_masking && !loaded.tone_curve);
        assert_eq!(s.unsharp_masking.len(), 2);
        assert_eq!(s.tone_curve.num_points(), 3);
        assert_eq!(s.lucy_richardson.iterations, 3);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let xml = r#"<helio><lucy-richardson sigma="abc" iterations="3" deringing="false"/></helio>"#;
        let mut s = ProcessingSettings::new();
        assert!(settings_from_xml(xml, &mut s).is_err());
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        let original = sample_settings();
        save_settings(&path, &original).unwrap();

        let mut restored = ProcessingSettings::new();
        load_settings(&path, &mut restored).unwrap();
        assert_eq!(restored.unsharp_masking.len(), 2);
    }
}
