//! Argument parsers shared across CLI commands.

use volstream::multiscale::Subregion;

/// Parses a `ZxYxX` shape such as `64x2048x2048`.
pub fn parse_zyx(s: &str) -> Result<[usize; 3], String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    if parts.len() != 3 {
        return Err(format!("expected ZxYxX, got '{}'", s));
    }

    let mut out = [0; 3];
    for (axis, part) in parts.iter().enumerate() {
        out[axis] = part
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a positive integer", part))?;
        if out[axis] == 0 {
            return Err(format!("dimension {} of '{}' is zero", axis, s));
        }
    }
    Ok(out)
}

/// Parses a normalized region `z0,y0,x0,z1,y1,x1`.
pub fn parse_region(s: &str) -> Result<Subregion, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", v))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != 6 {
        return Err(format!(
            "expected 6 values z0,y0,x0,z1,y1,x1, got {}",
            values.len()
        ));
    }

    let region = Subregion::new(
        [values[0], values[1], values[2]],
        [values[3], values[4], values[5]],
    );
    region.validate().map_err(|e| e.to_string())?;
    Ok(region)
}
