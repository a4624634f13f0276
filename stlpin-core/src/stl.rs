/// STL decoder for binary and ASCII formats
use log::debug;
use nalgebra::{Point3, Vector3};
use nom::{
    bytes::complete::{tag, take},
    character::complete::{multispace0, multispace1},
    combinator::{all_consuming, map},
    multi::count,
    number::complete::{float, le_f32, le_u16, le_u32},
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::StlError;
use crate::geometry::{Triangle, TriangleBuffer};

const HEADER_LEN: usize = 80;
const PREAMBLE_LEN: usize = HEADER_LEN + 4;
const RECORD_LEN: usize = 50;

/// Detect the variant and decode an STL resource
pub fn decode(data: &[u8]) -> Result<TriangleBuffer, StlError> {
    if let Some(triangles) = declared_triangle_count(data) {
        let expected = binary_len(triangles);
        if expected == Some(data.len()) {
            return parse_binary_stl(data);
        }
    }

    if looks_like_ascii(data) {
        // Exporters often write solid names and comments in Latin-1
        let text = String::from_utf8_lossy(data);
        match parse_ascii_stl(&text) {
            // Binary header that happens to start with "solid"
            Err(StlError::Unrecognized) if data.len() >= PREAMBLE_LEN => {}
            result => return result,
        }
    }

    if data.len() >= PREAMBLE_LEN {
        // Reports the length mismatch
        return parse_binary_stl(data);
    }

    Err(StlError::Unrecognized)
}

/// Decode and move the bounding box center to the origin
pub fn decode_centered(data: &[u8]) -> Result<TriangleBuffer, StlError> {
    let mut mesh = decode(data)?;
    let offset = mesh.recenter();
    debug!("decoded {} triangles, recentered by {:?}", mesh.len(), offset);
    Ok(mesh)
}

fn declared_triangle_count(data: &[u8]) -> Option<u32> {
    let bytes = data.get(HEADER_LEN..PREAMBLE_LEN)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn binary_len(triangles: u32) -> Option<usize> {
    (triangles as usize)
        .checked_mul(RECORD_LEN)?
        .checked_add(PREAMBLE_LEN)
}

fn looks_like_ascii(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(b"solid")
}

/// Parse a binary STL file.
///
/// The resource length must be exactly `84 + 50 * N`.
pub fn parse_binary_stl(data: &[u8]) -> Result<TriangleBuffer, StlError> {
    let triangles = declared_triangle_count(data).ok_or(StlError::Unrecognized)?;
    let expected = binary_len(triangles).unwrap_or(usize::MAX);
    if data.len() != expected {
        return Err(StlError::LengthMismatch {
            expected,
            actual: data.len(),
            triangles,
        });
    }

    let triangles = triangles as usize;
    let parsed = all_consuming(|input| binary_body(input, triangles))(data);
    match parsed {
        Ok((_, triangles)) => Ok(TriangleBuffer { triangles }),
        Err(_) => Err(StlError::Unrecognized),
    }
}

fn binary_body(input: &[u8], triangles: usize) -> IResult<&[u8], Vec<Triangle>> {
    let (input, _header) = take(HEADER_LEN)(input)?;
    let (input, _count) = le_u32(input)?;
    count(binary_facet, triangles)(input)
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Triangle> {
    let (input, normal) = le_vector3(input)?;
    let (input, v0) = le_vector3(input)?;
    let (input, v1) = le_vector3(input)?;
    let (input, v2) = le_vector3(input)?;
    // Attribute byte count
    let (input, _) = le_u16(input)?;
    Ok((
        input,
        Triangle::from_facet(normal, [v0.into(), v1.into(), v2.into()]),
    ))
}

fn le_vector3(input: &[u8]) -> IResult<&[u8], Vector3<f32>> {
    map(tuple((le_f32, le_f32, le_f32)), |(x, y, z)| {
        Vector3::new(x, y, z)
    })(input)
}

/// Parse an ASCII STL file
///
/// Lines are scanned one at a time; `outer loop`, `endfacet` and blank lines
/// may appear anywhere around the vertex lines.
pub fn parse_ascii_stl(input: &str) -> Result<TriangleBuffer, StlError> {
    let mut mesh = TriangleBuffer::new();
    let mut saw_endsolid = false;
    let mut lines = input
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()));

    while let Some((line_no, line)) = lines.next() {
        match keyword(line) {
            "facet" => {
                let normal = parse_line(facet_normal, line_no, line)?;
                let corners = read_loop(&mut lines, line_no)?;
                mesh.add_triangle(Triangle::from_facet(normal, corners));
            }
            "endsolid" => saw_endsolid = true,
            "vertex" => {
                return Err(StlError::InvalidLine {
                    line: line_no,
                    content: line.to_string(),
                })
            }
            // solid names, endfacet, blank lines
            _ => {}
        }
    }

    if mesh.is_empty() && !saw_endsolid {
        return Err(StlError::Unrecognized);
    }
    Ok(mesh)
}

/// Collect the three vertices of the facet opened on `facet_line`
fn read_loop<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    facet_line: usize,
) -> Result<[Point3<f32>; 3], StlError> {
    let mut corners = [Point3::origin(); 3];
    let mut found = 0;

    for (line_no, line) in lines.by_ref() {
        match keyword(line) {
            "" | "outer" => {}
            "vertex" => {
                if found == corners.len() {
                    return Err(StlError::ExtraVertex { line: line_no });
                }
                corners[found] = parse_line(vertex, line_no, line)?;
                found += 1;
            }
            "endloop" | "endfacet" => break,
            _ => return Err(StlError::TruncatedFacet { line: line_no }),
        }
    }

    if found < corners.len() {
        return Err(StlError::TruncatedFacet { line: facet_line });
    }
    Ok(corners)
}

fn keyword(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn parse_line<'a, T>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
    line_no: usize,
    line: &'a str,
) -> Result<T, StlError> {
    match all_consuming(terminated(parser, multispace0))(line) {
        Ok((_, value)) => Ok(value),
        Err(_) => Err(StlError::InvalidLine {
            line: line_no,
            content: line.to_string(),
        }),
    }
}

fn facet_normal(input: &str) -> IResult<&str, Vector3<f32>> {
    preceded(
        tuple((tag("facet"), multispace1, tag("normal"))),
        parse_vector3,
    )(input)
}

fn vertex(input: &str) -> IResult<&str, Point3<f32>> {
    map(preceded(tag("vertex"), parse_vector3), Point3::from)(input)
}

fn parse_vector3(input: &str) -> IResult<&str, Vector3<f32>> {
    map(
        tuple((
            preceded(multispace1, float),
            preceded(multispace1, float),
            preceded(multispace1, float),
        )),
        |(x, y, z)| Vector3::new(x, y, z),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_TRIANGLE: &str = "solid tri
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid tri
";

    fn binary_stl(facets: &[([f32; 3], [[f32; 3]; 3])]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for (normal, corners) in facets {
            for value in normal.iter().chain(corners.iter().flatten()) {
                data.extend_from_slice(&value.to_le_bytes());
            }
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_parse_binary_header() {
        let mut data = vec![0u8; 84];
        // Set triangle count to 0
        data[80..84].copy_from_slice(&0u32.to_le_bytes());

        let mesh = decode(&data).unwrap();
        assert_eq!(mesh.triangles.len(), 0);
    }

    #[test]
    fn test_binary_triangle_count_and_layout() {
        let data = binary_stl(&[
            ([0.0, 0.0, 1.0], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            ([0.0, 0.0, -1.0], [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        ]);
        assert_eq!(data.len(), 84 + 2 * 50);

        let mesh = decode(&data).unwrap();
        assert_eq!(mesh.len(), 2);
        assert_eq!(mesh.triangles[0].vertices[1].position, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.triangles[1].normal(), Vector3::new(0.0, 0.0, -1.0));
        assert!(mesh.triangles[1]
            .vertices
            .iter()
            .all(|v| v.normal == Vector3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_binary_with_solid_header_is_still_binary() {
        let mut data = binary_stl(&[(
            [0.0, 0.0, 1.0],
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )]);
        data[..5].copy_from_slice(b"solid");

        assert_eq!(decode(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_binary_length_mismatch_is_an_error() {
        let mut data = binary_stl(&[(
            [0.0, 0.0, 1.0],
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )]);
        data.pop();

        assert_eq!(
            decode(&data),
            Err(StlError::LengthMismatch {
                expected: 134,
                actual: 133,
                triangles: 1,
            })
        );
    }

    #[test]
    fn test_truncated_binary_with_solid_header_reports_length() {
        let mut data = binary_stl(&[(
            [0.0, 0.0, 1.0],
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )]);
        data[..5].copy_from_slice(b"solid");
        data.pop();

        assert!(matches!(decode(&data), Err(StlError::LengthMismatch { triangles: 1, .. })));
    }

    #[test]
    fn test_ascii_with_latin1_name() {
        let mut data = b"solid caf\xe9\n".to_vec();
        data.extend_from_slice(ASCII_TRIANGLE.split_once('\n').unwrap().1.as_bytes());

        let mesh = decode(&data).unwrap();
        assert_eq!(mesh.len(), 1);
        assert_eq!(mesh.triangles[0].vertices[1].position, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_vertex_outside_facet_is_an_error() {
        let text = "solid t\nvertex 0 0 0\nendsolid t\n";
        assert_eq!(
            parse_ascii_stl(text),
            Err(StlError::InvalidLine {
                line: 2,
                content: "vertex 0 0 0".into(),
            })
        );
    }

    #[test]
    fn test_short_garbage_is_unrecognized() {
        assert_eq!(decode(b"hello"), Err(StlError::Unrecognized));
        assert_eq!(decode(b""), Err(StlError::Unrecognized));
    }

    #[test]
    fn test_parse_ascii_triangle() {
        let mesh = decode(ASCII_TRIANGLE.as_bytes()).unwrap();
        assert_eq!(mesh.len(), 1);
        assert_eq!(mesh.triangles[0].normal(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.triangles[0].vertices[2].position, Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_ascii_tolerates_whitespace_and_missing_outer_loop() {
        let text = "\n\t solid  spaced \r\n\
            facet   normal\t1e0 0 0  \r\n\
            \r\n\
            vertex 1 0 0\r\n\
              outer loop\r\n\
            vertex   1 1 0\r\n\
            vertex 1 0 1.5e-1  \r\n\
            endloop\r\n\
            endfacet\r\n\
            endsolid\r\n";

        let mesh = decode(text.as_bytes()).unwrap();
        assert_eq!(mesh.len(), 1);
        assert_eq!(mesh.triangles[0].vertices[2].position, Point3::new(1.0, 0.0, 0.15));
    }

    #[test]
    fn test_truncated_facet_is_an_error() {
        let text = "solid t
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
endloop
endfacet
endsolid t
";
        assert_eq!(parse_ascii_stl(text), Err(StlError::TruncatedFacet { line: 2 }));
    }

    #[test]
    fn test_facet_cut_off_by_end_of_input() {
        let text = "solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\n";
        assert_eq!(parse_ascii_stl(text), Err(StlError::TruncatedFacet { line: 2 }));
    }

    #[test]
    fn test_extra_vertex_is_an_error() {
        let text = "solid t
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
vertex 0 1 0
vertex 1 1 0
endloop
endfacet
endsolid t
";
        assert_eq!(parse_ascii_stl(text), Err(StlError::ExtraVertex { line: 7 }));
    }

    #[test]
    fn test_invalid_number_names_the_line() {
        let text = ASCII_TRIANGLE.replace("vertex 1 0 0", "vertex 1 zero 0");
        match parse_ascii_stl(&text) {
            Err(StlError::InvalidLine { line, content }) => {
                assert_eq!(line, 5);
                assert_eq!(content, "vertex 1 zero 0");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ascii_without_facets_or_endsolid_is_unrecognized() {
        assert_eq!(decode(b"solid but nothing else"), Err(StlError::Unrecognized));
        assert_eq!(decode(b"solid empty\nendsolid empty\n").unwrap().len(), 0);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let first = decode(ASCII_TRIANGLE.as_bytes()).unwrap();
        let second = decode(ASCII_TRIANGLE.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_centered() {
        let mesh = decode_centered(ASCII_TRIANGLE.as_bytes()).unwrap();
        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.center(), Point3::origin());
        assert_eq!(mesh.triangles[0].vertices[0].position, Point3::new(-0.5, -0.5, 0.0));
    }
}
