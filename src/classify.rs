use crate::types::{FieldValue, Nivel};

const ALTO_MIN: f64 = 10.0;
const SOBRE_PROMEDIO_MIN: f64 = 6.0;

/// Band for a percentage. Lower bounds are inclusive.
pub fn classify(porcentaje: Option<f64>) -> Nivel {
    match porcentaje {
        None => Nivel::SinDatos,
        Some(p) if p.is_nan() => Nivel::SinDatos,
        Some(p) if p >= ALTO_MIN => Nivel::Alto,
        Some(p) if p >= SOBRE_PROMEDIO_MIN => Nivel::SobrePromedio,
        Some(_) => Nivel::Normal,
    }
}

/// Same as [`classify`] for a parsed field; unparsed text counts as no data.
pub fn classify_value(porcentaje: Option<&FieldValue>) -> Nivel {
    classify(porcentaje.and_then(FieldValue::as_f64))
}
