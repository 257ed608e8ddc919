use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{OverlayError, Result};
use crate::plane::SeaPlane;

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let file_path = file_path.as_ref();
    let contents = std::fs::read_to_string(file_path)
        .map_err(|e| OverlayError::input(format!("{}: {}", file_path.display(), e)))?;
    Ok(serde_json::from_str(&contents)?)
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| OverlayError::input(format!("cannot read {}: {}", path.display(), e)))
}

fn parse_numbers(text: &str, path: &Path) -> Result<Vec<f64>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| {
                OverlayError::input(format!("{}: '{}' is not a number", path.display(), s))
            })
        })
        .collect()
}

/// Matrix node of an XML `FileStorage` document: the first element with
/// `rows`, `cols` and `data` children.
fn ocv_xml_matrix(text: &str) -> std::result::Result<(usize, usize, Vec<f64>), String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let node = doc
        .descendants()
        .find(|n| n.children().any(|c| c.has_tag_name("rows")))
        .ok_or("no matrix node")?;
    let field = |tag: &str| {
        node.children()
            .find(|c| c.has_tag_name(tag))
            .and_then(|c| c.text())
            .ok_or(format!("missing <{}>", tag))
    };
    let rows = field("rows")?.trim().parse().map_err(|_| "rows is not an integer")?;
    let cols = field("cols")?.trim().parse().map_err(|_| "cols is not an integer")?;
    let data = field("data")?
        .split_whitespace()
        .map(|v| v.parse::<f64>().map_err(|_| format!("'{}' is not a number", v)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((rows, cols, data))
}

#[derive(Deserialize)]
struct OcvYamlMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Matrix node of a YAML `FileStorage` document. The `%YAML:1.0` directive
/// and `!!opencv-matrix` tags are not YAML 1.2 and are stripped first.
fn ocv_yaml_matrix(text: &str) -> std::result::Result<(usize, usize, Vec<f64>), String> {
    let cleaned: String = text
        .lines()
        .filter(|l| !l.starts_with('%'))
        .map(|l| l.replace("!!opencv-matrix", ""))
        .collect::<Vec<_>>()
        .join("\n");
    let nodes: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(&cleaned).map_err(|e| e.to_string())?;
    let m = nodes
        .into_values()
        .find_map(|v| serde_yaml::from_value::<OcvYamlMatrix>(v).ok())
        .ok_or("no matrix node")?;
    Ok((m.rows, m.cols, m.data))
}

/// Reads the first matrix node of an OpenCV `FileStorage` file, XML or YAML.
pub fn load_ocv_matrix<P: AsRef<Path>>(path: P) -> Result<na::DMatrix<f64>> {
    let path = path.as_ref();
    let text = read_input(path)?;
    let parsed = if text.trim_start().starts_with("%YAML") {
        ocv_yaml_matrix(&text)
    } else {
        ocv_xml_matrix(&text)
    };
    let (rows, cols, values) =
        parsed.map_err(|e| OverlayError::input(format!("{}: {}", path.display(), e)))?;
    if values.len() != rows * cols {
        return Err(OverlayError::input(format!(
            "{}: expected {}x{} values, found {}",
            path.display(),
            rows,
            cols,
            values.len()
        )));
    }
    Ok(na::DMatrix::from_row_slice(rows, cols, &values))
}

/// Reads a sea-plane file of four whitespace separated values `a b c d`.
///
/// A file holding several planes (one per line, as produced per stereo
/// frame) is averaged into a single mean plane.
pub fn read_plane_file<P: AsRef<Path>>(path: P) -> Result<SeaPlane> {
    let path = path.as_ref();
    let values = parse_numbers(&read_input(path)?, path)?;
    if values.len() == 4 {
        return SeaPlane::from_slice(&values);
    }
    if values.is_empty() || values.len() % 4 != 0 {
        return Err(OverlayError::input(format!(
            "{}: expected 4 plane coefficients, found {}",
            path.display(),
            values.len()
        )));
    }
    let n = values.len() / 4;
    log::info!("averaging {} planes from {}", n, path.display());
    let mut mean = [0.0; 4];
    for plane in values.chunks_exact(4) {
        for (m, v) in mean.iter_mut().zip(plane) {
            *m += v / n as f64;
        }
    }
    SeaPlane::from_slice(&mean)
}

/// Reads a 3x4 or 4x4 camera matrix, padding 3x4 with a `[0, 0, 0, 1]` row.
pub fn read_camera_pose<P: AsRef<Path>>(path: P) -> Result<na::Matrix4<f64>> {
    let path = path.as_ref();
    let values = parse_numbers(&read_input(path)?, path)?;
    match values.len() {
        12 => {
            let mut m = na::Matrix4::identity();
            m.fixed_view_mut::<3, 4>(0, 0)
                .copy_from(&na::Matrix3x4::from_row_slice(&values));
            Ok(m)
        }
        16 => Ok(na::Matrix4::from_row_slice(&values)),
        n => Err(OverlayError::input(format!(
            "{}: camera matrix needs 12 or 16 values, found {}",
            path.display(),
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_matrix_node_is_found_under_any_root() {
        let s = "<?xml version=\"1.0\"?><opencv_storage><K type_id=\"opencv-matrix\">\
                 <rows>1</rows><cols>2</cols><dt>d</dt><data>\n 1.5 -2.</data></K></opencv_storage>";
        assert_eq!(ocv_xml_matrix(s).unwrap(), (1, 2, vec![1.5, -2.0]));
        assert!(ocv_xml_matrix("<a><rows>1</rows></a>").is_err());
    }

    #[test]
    fn yaml_directive_and_tags_are_stripped() {
        let s = "%YAML:1.0\n---\nD: !!opencv-matrix\n   rows: 1\n   cols: 3\n   dt: d\n   data: [ 0.1, 0., -0.2 ]\n";
        assert_eq!(ocv_yaml_matrix(s).unwrap(), (1, 3, vec![0.1, 0.0, -0.2]));
    }
}
