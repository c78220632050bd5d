//! Scalar textual encoding of values: each kind maps to a fixed tag-subtree
//! shape keyed by the tag's `name` attribute.
//!
//! Reference values are asymmetric: decoding yields a placeholder that the
//! tree-level codec resolves after the whole document is walked, and encoding
//! needs a referent label from the registry, so the tree codec builds the tag
//! via [`reference_tag`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::document::Tag;

use super::{
    Axes, CFrame, Color3, Content, Faces, Ray, UDim2, Value, ValueType, Vector2, Vector2int16,
    Vector3, Vector3int16, UDim,
};

/// Encode a value as its property tag. The `name` attribute is attached by
/// the caller's shape. Returns `None` for kinds with no textual form (`UDim`)
/// and for references (see [`reference_tag`]).
pub fn encode_tag(name: &str, value: &Value) -> Option<Tag> {
    let tag = match value {
        Value::Axes(axes) => Tag::new("Axes")
            .with_child(Tag::with_text("axes", axes.to_bits().to_string())),

        Value::BinaryString(bytes) => {
            let mut tag = Tag::new("BinaryString");
            tag.no_indent = true;
            set_content(&mut tag, &wrap_lines(&BASE64.encode(bytes), 72));
            tag
        }

        Value::Bool(b) => Tag::with_text("bool", if *b { "true" } else { "false" }),

        // Brick colors write as plain ints; the palette index is all there is.
        Value::BrickColor(c) => Tag::with_text("int", c.to_string()),

        Value::CFrame(cf) => {
            let mut tag = Tag::new("CoordinateFrame")
                .with_child(Tag::with_text("X", encode_float(cf.position.x)))
                .with_child(Tag::with_text("Y", encode_float(cf.position.y)))
                .with_child(Tag::with_text("Z", encode_float(cf.position.z)));
            const NAMES: [&str; 9] = [
                "R00", "R01", "R02", "R10", "R11", "R12", "R20", "R21", "R22",
            ];
            for (component_name, component) in NAMES.iter().zip(cf.rotation) {
                tag = tag.with_child(Tag::with_text(*component_name, encode_float(component)));
            }
            tag
        }

        Value::Color3(c) => Tag::new("Color3")
            .with_child(Tag::with_text("R", encode_float(c.r)))
            .with_child(Tag::with_text("G", encode_float(c.g)))
            .with_child(Tag::with_text("B", encode_float(c.b))),

        Value::Content(content) => {
            let mut tag = Tag::new("Content");
            tag.no_indent = true;
            let inner = match content {
                Content::None => Tag::with_text("null", ""),
                Content::Url(url) => Tag::with_text("url", url.clone()),
            };
            tag.with_child(inner)
        }

        Value::Double(d) => Tag::with_text("double", encode_double(*d)),

        Value::Faces(faces) => Tag::new("Faces")
            .with_child(Tag::with_text("faces", faces.to_bits().to_string())),

        Value::Float(f) => Tag::with_text("float", encode_float(*f)),

        Value::Int(n) => Tag::with_text("int", n.to_string()),

        Value::ProtectedString(s) => {
            let mut tag = Tag::new("ProtectedString");
            tag.no_indent = true;
            set_content(&mut tag, s);
            tag
        }

        Value::Ray(ray) => Tag::new("Ray")
            .with_child(
                Tag::new("origin")
                    .with_child(Tag::with_text("X", encode_float(ray.origin.x)))
                    .with_child(Tag::with_text("Y", encode_float(ray.origin.y)))
                    .with_child(Tag::with_text("Z", encode_float(ray.origin.z))),
            )
            .with_child(
                Tag::new("direction")
                    .with_child(Tag::with_text("X", encode_float(ray.direction.x)))
                    .with_child(Tag::with_text("Y", encode_float(ray.direction.y)))
                    .with_child(Tag::with_text("Z", encode_float(ray.direction.z))),
            ),

        Value::String(s) => Tag::with_text("string", s.clone()),

        Value::Token(t) => Tag::with_text("token", t.to_string()),

        Value::UDim(_) => return None,

        Value::UDim2(u) => Tag::new("UDim2")
            .with_child(Tag::with_text("XS", encode_float(u.x.scale)))
            .with_child(Tag::with_text("XO", u.x.offset.to_string()))
            .with_child(Tag::with_text("YS", encode_float(u.y.scale)))
            .with_child(Tag::with_text("YO", u.y.offset.to_string())),

        Value::Vector2(v) => Tag::new("Vector2")
            .with_child(Tag::with_text("X", encode_float(v.x)))
            .with_child(Tag::with_text("Y", encode_float(v.y))),

        Value::Vector2int16(v) => Tag::new("Vector2int16")
            .with_child(Tag::with_text("X", v.x.to_string()))
            .with_child(Tag::with_text("Y", v.y.to_string())),

        Value::Vector3(v) => Tag::new("Vector3")
            .with_child(Tag::with_text("X", encode_float(v.x)))
            .with_child(Tag::with_text("Y", encode_float(v.y)))
            .with_child(Tag::with_text("Z", encode_float(v.z))),

        Value::Vector3int16(v) => Tag::new("Vector3int16")
            .with_child(Tag::with_text("X", v.x.to_string()))
            .with_child(Tag::with_text("Y", v.y.to_string()))
            .with_child(Tag::with_text("Z", v.z.to_string())),

        Value::Reference(_) => return None,
    };
    Some(named(tag, name))
}

/// Build the property tag for a reference value. `referent` is the target's
/// label, or `None` for the null reference.
pub fn reference_tag(name: &str, referent: Option<&str>) -> Tag {
    let tag = Tag::with_text("Ref", referent.unwrap_or("null"));
    named(tag, name)
}

fn named(mut tag: Tag, name: &str) -> Tag {
    tag.attrs.insert(
        0,
        crate::document::Attr {
            name: "name".to_string(),
            value: name.to_string(),
        },
    );
    tag
}

/// Decode a property tag as the given type. `None` means the value is
/// malformed for that type (the property is then skipped). Reference tags
/// decode to the null placeholder; the tree codec resolves the referent from
/// the tag content afterwards.
pub fn decode_tag(tag: &Tag, ty: ValueType) -> Option<Value> {
    let value = match ty {
        ValueType::Axes => {
            let bits = component_i32(tag, "axes");
            Value::Axes(Axes::from_bits(bits as u8))
        }

        ValueType::BinaryString => {
            // The external writer wraps base64 output; strip whitespace
            // before decoding.
            let stripped: String = tag
                .content()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            Value::BinaryString(BASE64.decode(stripped.as_bytes()).ok()?)
        }

        ValueType::Bool => match tag.content() {
            "false" | "False" | "FALSE" => Value::Bool(false),
            "true" | "True" | "TRUE" => Value::Bool(true),
            _ => return None,
        },

        ValueType::BrickColor => Value::BrickColor(tag.content().parse::<u32>().ok()?),

        ValueType::CFrame => {
            let mut cf = CFrame {
                position: Vector3::new(
                    component_f32(tag, "X"),
                    component_f32(tag, "Y"),
                    component_f32(tag, "Z"),
                ),
                rotation: [0.0; 9],
            };
            const NAMES: [&str; 9] = [
                "R00", "R01", "R02", "R10", "R11", "R12", "R20", "R21", "R22",
            ];
            for (component_name, component) in NAMES.iter().zip(cf.rotation.iter_mut()) {
                *component = component_f32(tag, component_name);
            }
            Value::CFrame(cf)
        }

        ValueType::Color3 => {
            if tag.tags.is_empty() {
                // Compact packed form: 0xFF << 24 | R << 16 | G << 8 | B.
                let packed = tag.content().parse::<u32>().ok()?;
                Value::Color3(Color3 {
                    r: ((packed & 0x00FF_0000) >> 16) as f32 / 255.0,
                    g: ((packed & 0x0000_FF00) >> 8) as f32 / 255.0,
                    b: (packed & 0x0000_00FF) as f32 / 255.0,
                })
            } else {
                Value::Color3(Color3 {
                    r: component_f32(tag, "R"),
                    g: component_f32(tag, "G"),
                    b: component_f32(tag, "B"),
                })
            }
        }

        ValueType::Content => {
            // A content tag carries its payload in a subtag; raw character
            // content here is malformed. An empty CDATA marker counts as
            // content.
            let has_raw = match &tag.cdata {
                Some(cdata) => !cdata.is_empty(),
                None => !tag.text.is_empty(),
            };
            if has_raw {
                return None;
            }
            let subtag = tag.tags.first()?;
            match subtag.start_name.as_str() {
                "binary" | "hash" | "null" => Value::Content(Content::None),
                "url" => Value::Content(Content::Url(subtag.content().to_string())),
                _ => return None,
            }
        }

        ValueType::Double => Value::Double(tag.content().parse::<f64>().ok()?),

        ValueType::Faces => {
            let bits = component_i32(tag, "faces");
            Value::Faces(Faces::from_bits(bits as u8))
        }

        ValueType::Float => Value::Float(tag.content().parse::<f32>().ok()?),

        ValueType::Int => Value::Int(tag.content().parse::<i32>().ok()?),

        ValueType::ProtectedString => Value::ProtectedString(tag.content().to_string()),

        ValueType::Ray => {
            let origin = tag.child("origin");
            let direction = tag.child("direction");
            Value::Ray(Ray {
                origin: origin.map(vector3_components).unwrap_or_default(),
                direction: direction.map(vector3_components).unwrap_or_default(),
            })
        }

        // Placeholder; the referent in the tag content is resolved by the
        // tree codec once every instance is known.
        ValueType::Reference => Value::null_reference(),

        ValueType::String => Value::String(tag.content().to_string()),

        ValueType::Token => Value::Token(tag.content().parse::<u32>().ok()?),

        // No known textual form.
        ValueType::UDim => return None,

        ValueType::UDim2 => Value::UDim2(UDim2 {
            x: UDim {
                scale: component_f32(tag, "XS"),
                offset: component_i32(tag, "XO"),
            },
            y: UDim {
                scale: component_f32(tag, "YS"),
                offset: component_i32(tag, "YO"),
            },
        }),

        ValueType::Vector2 => Value::Vector2(Vector2 {
            x: component_f32(tag, "X"),
            y: component_f32(tag, "Y"),
        }),

        ValueType::Vector2int16 => Value::Vector2int16(Vector2int16 {
            x: component_i16(tag, "X"),
            y: component_i16(tag, "Y"),
        }),

        ValueType::Vector3 => Value::Vector3(vector3_components(tag)),

        ValueType::Vector3int16 => Value::Vector3int16(Vector3int16 {
            x: component_i16(tag, "X"),
            y: component_i16(tag, "Y"),
            z: component_i16(tag, "Z"),
        }),
    };
    Some(value)
}

// Component subtags: only the first occurrence counts; a missing or
// unparsable component reads as zero.

fn component_f32(tag: &Tag, name: &str) -> f32 {
    tag.child(name)
        .and_then(|t| t.content().parse().ok())
        .unwrap_or(0.0)
}

fn component_i32(tag: &Tag, name: &str) -> i32 {
    tag.child(name)
        .and_then(|t| t.content().parse().ok())
        .unwrap_or(0)
}

fn component_i16(tag: &Tag, name: &str) -> i16 {
    tag.child(name)
        .and_then(|t| t.content().parse().ok())
        .unwrap_or(0)
}

fn vector3_components(tag: &Tag) -> Vector3 {
    Vector3::new(
        component_f32(tag, "X"),
        component_f32(tag, "Y"),
        component_f32(tag, "Z"),
    )
}

/// Store character content in a tag, preferring CDATA when the payload
/// allows it.
fn set_content(tag: &mut Tag, text: &str) {
    if !text.is_empty() && !text.contains("]]>") {
        tag.cdata = Some(text.to_string());
    } else {
        tag.text = text.to_string();
    }
}

fn wrap_lines(s: &str, width: usize) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / width);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && i % width == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out
}

/// Format a float with up to nine significant digits, `%g` style, padding
/// the exponent to at least three digits.
pub fn encode_float(f: f32) -> String {
    format_g(f as f64, 9, 3)
}

/// Format a double with up to nine significant digits, `%g` style.
pub fn encode_double(f: f64) -> String {
    format_g(f, 9, 2)
}

fn format_g(value: f64, sig: usize, min_exp_digits: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let rendered = format!("{:.*e}", sig - 1, value.abs());
    let Some(epos) = rendered.find('e') else {
        return rendered;
    };
    let exp: i32 = rendered[epos + 1..].parse().unwrap_or(0);
    let mantissa: String = rendered[..epos].chars().filter(|c| *c != '.').collect();
    let digits = mantissa.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };

    let body = if exp < -4 || exp >= sig as i32 {
        let m = if digits.len() == 1 {
            digits.to_string()
        } else {
            format!("{}.{}", &digits[..1], &digits[1..])
        };
        let sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:0width$}",
            m,
            sign,
            exp.unsigned_abs(),
            width = min_exp_digits
        )
    } else if exp >= 0 {
        let point = exp as usize + 1;
        if digits.len() > point {
            format!("{}.{}", &digits[..point], &digits[point..])
        } else {
            format!("{}{}", digits, "0".repeat(point - digits.len()))
        }
    } else {
        format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
    };

    if value < 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_float_formats() {
        assert_eq!(encode_float(4.0), "4");
        assert_eq!(encode_float(0.5), "0.5");
        assert_eq!(encode_float(-1.25), "-1.25");
        assert_eq!(encode_float(0.0), "0");
        assert_eq!(encode_float(1e10), "1e+010");
        // 2^-17, exactly representable, lands in scientific notation.
        assert_eq!(encode_float(7.62939453125e-6), "7.62939453e-006");
        assert_eq!(encode_double(1.5e-5), "1.5e-05");
        assert_eq!(encode_double(123456789.0), "123456789");
    }

    #[test]
    fn test_encode_float_significant_digits() {
        // f32 0.1 is 0.10000000149..; nine significant digits.
        assert_eq!(encode_float(0.1), "0.100000001");
    }

    #[test]
    fn test_scalar_tag_roundtrip() {
        let cases = vec![
            (ValueType::Bool, Value::Bool(true)),
            (ValueType::Int, Value::Int(-42)),
            (ValueType::Float, Value::Float(2.5)),
            (ValueType::Double, Value::Double(-0.125)),
            (ValueType::String, Value::String("hello world".into())),
            (ValueType::Token, Value::Token(256)),
            (
                ValueType::Vector3,
                Value::Vector3(Vector3::new(4.0, 1.0, 2.0)),
            ),
            (
                ValueType::Color3,
                Value::Color3(Color3 {
                    r: 0.5,
                    g: 0.25,
                    b: 1.0,
                }),
            ),
            (
                ValueType::Ray,
                Value::Ray(Ray {
                    origin: Vector3::new(1.0, 2.0, 3.0),
                    direction: Vector3::new(-1.0, 0.0, 0.5),
                }),
            ),
            (
                ValueType::CFrame,
                Value::CFrame(CFrame {
                    position: Vector3::new(1.0, 2.0, 3.0),
                    ..CFrame::default()
                }),
            ),
            (
                ValueType::Content,
                Value::Content(Content::Url("rbxassetid://1".into())),
            ),
            (ValueType::Content, Value::Content(Content::None)),
            (
                ValueType::BinaryString,
                Value::BinaryString(vec![0, 1, 2, 250, 255]),
            ),
        ];
        for (ty, value) in cases {
            let tag = encode_tag("Prop", &value).expect("has text form");
            assert_eq!(tag.attr_value("name"), Some("Prop"));
            let back = decode_tag(&tag, ty).expect("decodes");
            assert_eq!(back, value, "{:?}", ty);
        }
    }

    #[test]
    fn test_brickcolor_encodes_as_int_tag() {
        let tag = encode_tag("BrickColorValue", &Value::BrickColor(194)).unwrap();
        assert_eq!(tag.start_name, "int");
        assert_eq!(
            decode_tag(&tag, ValueType::BrickColor),
            Some(Value::BrickColor(194))
        );
    }

    #[test]
    fn test_ray_direction_is_direction() {
        let ray = Ray {
            origin: Vector3::new(1.0, 2.0, 3.0),
            direction: Vector3::new(7.0, 8.0, 9.0),
        };
        let tag = encode_tag("CastPoint", &Value::Ray(ray)).unwrap();
        let direction = tag.child("direction").unwrap();
        assert_eq!(direction.child("X").unwrap().content(), "7");
    }

    #[test]
    fn test_color3_packed_decode() {
        let tag = Tag::with_text("Color3", format!("{}", 0xFF00_7F00u32)).with_attr("name", "c");
        let decoded = decode_tag(&tag, ValueType::Color3).unwrap();
        match decoded {
            Value::Color3(c) => {
                assert_eq!(c.r, 0.0);
                assert!((c.g - 127.0 / 255.0).abs() < 1e-6);
                assert_eq!(c.b, 0.0);
            }
            other => panic!("expected Color3, got {:?}", other),
        }
    }

    #[test]
    fn test_bool_strict_spellings() {
        for (text, expected) in [("true", true), ("TRUE", true), ("False", false)] {
            let tag = Tag::with_text("bool", text);
            assert_eq!(decode_tag(&tag, ValueType::Bool), Some(Value::Bool(expected)));
        }
        assert_eq!(decode_tag(&Tag::with_text("bool", "1"), ValueType::Bool), None);
    }

    #[test]
    fn test_content_rejects_raw_text() {
        let mut tag = Tag::with_text("Content", "stray");
        tag.tags.push(Tag::with_text("url", "x"));
        assert_eq!(decode_tag(&tag, ValueType::Content), None);

        let empty = Tag::new("Content");
        assert_eq!(decode_tag(&empty, ValueType::Content), None);
    }

    #[test]
    fn test_udim_has_no_text_form() {
        assert!(encode_tag("u", &Value::UDim(UDim::default())).is_none());
        assert!(decode_tag(&Tag::new("UDim"), ValueType::UDim).is_none());
    }

    #[test]
    fn test_binary_string_wraps_lines() {
        let bytes = vec![0xAB; 100];
        let tag = encode_tag("Data", &Value::BinaryString(bytes.clone())).unwrap();
        let content = tag.content();
        assert!(content.contains('\n'));
        assert!(content.lines().all(|line| line.len() <= 72));
        assert_eq!(
            decode_tag(&tag, ValueType::BinaryString),
            Some(Value::BinaryString(bytes))
        );
    }

    #[test]
    fn test_missing_components_default_to_zero() {
        let tag = Tag::new("Vector3").with_child(Tag::with_text("Y", "5"));
        assert_eq!(
            decode_tag(&tag, ValueType::Vector3),
            Some(Value::Vector3(Vector3::new(0.0, 5.0, 0.0)))
        );
    }
}
