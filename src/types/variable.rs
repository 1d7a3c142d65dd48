//! Crosswalk between CDS variable identifiers and the field names used by
//! the AWS open-data store for the same quantities.

/// CDS name on the left, AWS store field name on the right.
pub(crate) const CDS_TO_AWS_NAMES: &[(&str, &str)] = &[
    ("10m_u_component_of_wind", "eastward_wind_at_10_metres"),
    ("10m_v_component_of_wind", "northward_wind_at_10_metres"),
    ("100m_u_component_of_wind", "eastward_wind_at_100_metres"),
    ("100m_v_component_of_wind", "northward_wind_at_100_metres"),
    ("2m_dewpoint_temperature", "dew_point_temperature_at_2_metres"),
    ("2m_temperature", "air_temperature_at_2_metres"),
    (
        "maximum_2m_temperature_since_previous_post_processing",
        "air_temperature_at_2_metres_1hour_Maximum",
    ),
    (
        "minimum_2m_temperature_since_previous_post_processing",
        "air_temperature_at_2_metres_1hour_Minimum",
    ),
    ("mean_sea_level_pressure", "air_pressure_at_mean_sea_level"),
    ("mean_wave_period", "sea_surface_wave_mean_period"),
    ("mean_wave_direction", "sea_surface_wave_from_direction"),
    (
        "significant_height_of_total_swell",
        "significant_height_of_wind_and_swell_waves",
    ),
    ("snow_density", "snow_density"),
    ("snow_depth", "lwe_thickness_of_surface_snow_amount"),
    ("surface_pressure", "surface_air_pressure"),
    (
        "surface_solar_radiation_downwards",
        "integral_wrt_time_of_surface_direct_downwelling_shortwave_flux_in_air_1hour_Accumulation",
    ),
    ("total_precipitation", "precipitation_amount_1hour_Accumulation"),
];

/// Resolves either spelling of a variable to the AWS store field name.
pub(crate) fn to_store_field(variable: &str) -> Option<&'static str> {
    CDS_TO_AWS_NAMES
        .iter()
        .find(|(cds, aws)| *cds == variable || *aws == variable)
        .map(|(_, aws)| *aws)
}

/// The canonical (CDS) name for a store field, or the name itself when it
/// is not part of the crosswalk.
pub(crate) fn to_canonical(name: &str) -> &str {
    CDS_TO_AWS_NAMES
        .iter()
        .find(|(_, aws)| *aws == name)
        .map_or(name, |(cds, _)| *cds)
}
