// DriftClock Sunrise/Sunset
// Approximate solar ephemeris for apparent rise and set times

use std::f64::consts::PI;

const RADEG: f64 = 180.0 / PI;
const DEGRAD: f64 = PI / 180.0;

/// Standard refraction at the horizon, in degrees.
pub const HORIZON_ALTITUDE: f64 = -35.0 / 60.0;

/// Rise and set times for one date, in fractional UTC hours.
///
/// `rise` may be negative and `set` may exceed 24 when the event falls on
/// the neighbouring UTC day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunTimes {
    Normal { rise: f64, set: f64 },
    /// Sun stays above the horizon all day (polar day).
    AlwaysUp,
    /// Sun stays below the horizon all day (polar night).
    AlwaysDown,
}

fn sind(x: f64) -> f64 {
    (x * DEGRAD).sin()
}

fn cosd(x: f64) -> f64 {
    (x * DEGRAD).cos()
}

fn atan2d(y: f64, x: f64) -> f64 {
    RADEG * y.atan2(x)
}

fn acosd(x: f64) -> f64 {
    RADEG * x.acos()
}

/// Reduce an angle to [0, 360).
fn revolution(x: f64) -> f64 {
    x - 360.0 * (x / 360.0).floor()
}

/// Reduce an angle to [-180, 180).
fn rev180(x: f64) -> f64 {
    x - 360.0 * (x / 360.0 + 0.5).floor()
}

/// Day number relative to 2000 Jan 0.0 UT, valid 1801-2099.
fn days_since_2000_jan_0(year: i32, month: u32, day: u32) -> i64 {
    let y = year as i64;
    let m = month as i64;
    let d = day as i64;
    367 * y - (7 * (y + (m + 9) / 12)) / 4 + (275 * m) / 9 + d - 730_530
}

/// Greenwich mean sidereal time at 0h UT, in degrees.
fn gmst0(d: f64) -> f64 {
    revolution((180.0 + 356.0470 + 282.9404) + (0.985_600_258_5 + 4.709_35e-5) * d)
}

/// Ecliptic longitude and distance (AU) of the sun.
fn sun_position(d: f64) -> (f64, f64) {
    let mean_anomaly = revolution(356.0470 + 0.985_600_258_5 * d);
    let perihelion = 282.9404 + 4.709_35e-5 * d;
    let ecc = 0.016_709 - 1.151e-9 * d;

    let ecc_anomaly = mean_anomaly
        + ecc * RADEG * sind(mean_anomaly) * (1.0 + ecc * cosd(mean_anomaly));
    let x = cosd(ecc_anomaly) - ecc;
    let y = (1.0 - ecc * ecc).sqrt() * sind(ecc_anomaly);
    let distance = (x * x + y * y).sqrt();
    let true_anomaly = atan2d(y, x);

    let mut lon = true_anomaly + perihelion;
    if lon >= 360.0 {
        lon -= 360.0;
    }
    (lon, distance)
}

/// Right ascension, declination (degrees) and distance of the sun.
fn sun_ra_dec(d: f64) -> (f64, f64, f64) {
    let (lon, r) = sun_position(d);
    let x = r * cosd(lon);
    let y = r * sind(lon);

    let obliquity = 23.4393 - 3.563e-7 * d;
    let z = y * sind(obliquity);
    let y = y * cosd(obliquity);

    let ra = atan2d(y, x);
    let dec = atan2d(z, (x * x + y * y).sqrt());
    (ra, dec, r)
}

/// Times at which the sun's centre (or upper limb) crosses `altitude`.
///
/// Longitude is positive east, latitude positive north.
pub fn sun_times_at_altitude(
    year: i32,
    month: u32,
    day: u32,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    upper_limb: bool,
) -> SunTimes {
    // Local noon at the given longitude
    let d = days_since_2000_jan_0(year, month, day) as f64 + 0.5 - longitude / 360.0;

    let sidereal = revolution(gmst0(d) + 180.0 + longitude);
    let (ra, dec, distance) = sun_ra_dec(d);
    let transit = 12.0 - rev180(sidereal - ra) / 15.0;

    let mut altitude = altitude;
    if upper_limb {
        altitude -= 0.2666 / distance;
    }

    let cost = (sind(altitude) - sind(latitude) * sind(dec)) / (cosd(latitude) * cosd(dec));
    if cost >= 1.0 {
        return SunTimes::AlwaysDown;
    }
    if cost <= -1.0 {
        return SunTimes::AlwaysUp;
    }

    let half_arc = acosd(cost) / 15.0;
    SunTimes::Normal {
        rise: transit - half_arc,
        set: transit + half_arc,
    }
}

/// Apparent sunrise and sunset in UTC hours.
pub fn sun_rise_set(year: i32, month: u32, day: u32, longitude: f64, latitude: f64) -> SunTimes {
    sun_times_at_altitude(year, month, day, longitude, latitude, HORIZON_ALTITUDE, true)
}
