//! Built-in demo catalog
//!
//! Served whenever the database is unconfigured or unreachable so the public
//! catalog never goes blank. Covers both marketplace countries and every
//! listing type.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::models::{Guide, Therapy, TherapyListing, TherapyStatus, TherapyType};

struct DemoGuide {
    slug: &'static str,
    name: &'static str,
    bio: &'static str,
    country: &'static str,
    city: &'static str,
    specialties: &'static [&'static str],
    verified: bool,
}

struct DemoTherapy {
    guide: usize,
    slug: &'static str,
    title: &'static str,
    description: &'static str,
    kind: TherapyType,
    location: &'static str,
    base_price: f64,
    currency: &'static str,
    duration: &'static str,
    capacity: Option<i32>,
}

const GUIDES: &[DemoGuide] = &[
    DemoGuide {
        slug: "lucia-mendoza",
        name: "Lucía Mendoza",
        bio: "Facilitadora de ceremonias de cacao y círculos de mujeres.",
        country: "spain",
        city: "Barcelona",
        specialties: &["cacao", "breathwork"],
        verified: true,
    },
    DemoGuide {
        slug: "andres-vidal",
        name: "Andrés Vidal",
        bio: "Terapeuta integrativo con formación en psicología transpersonal.",
        country: "spain",
        city: "Madrid",
        specialties: &["integration", "meditation"],
        verified: false,
    },
    DemoGuide {
        slug: "xochitl-ramirez",
        name: "Xóchitl Ramírez",
        bio: "Guardiana de temazcal y medicina tradicional mexicana.",
        country: "mexico",
        city: "Tepoztlán",
        specialties: &["temazcal", "herbalism"],
        verified: true,
    },
    DemoGuide {
        slug: "mateo-cruz",
        name: "Mateo Cruz",
        bio: "Músico y facilitador de viajes sonoros.",
        country: "mexico",
        city: "Oaxaca",
        specialties: &["sound healing"],
        verified: true,
    },
];

const THERAPIES: &[DemoTherapy] = &[
    DemoTherapy {
        guide: 0,
        slug: "ceremonia-de-cacao-barcelona",
        title: "Ceremonia de Cacao",
        description: "Círculo de cacao ceremonial con meditación guiada y música en vivo.",
        kind: TherapyType::Ceremony,
        location: "Barcelona",
        base_price: 40.0,
        currency: "EUR",
        duration: "3h",
        capacity: Some(15),
    },
    DemoTherapy {
        guide: 0,
        slug: "respiracion-consciente",
        title: "Respiración Consciente",
        description: "Sesión individual de breathwork para liberar tensión.",
        kind: TherapyType::Therapy,
        location: "Barcelona",
        base_price: 60.0,
        currency: "EUR",
        duration: "90min",
        capacity: Some(1),
    },
    DemoTherapy {
        guide: 1,
        slug: "sesion-de-integracion",
        title: "Sesión de Integración",
        description: "Acompañamiento terapéutico después de una experiencia de expansión.",
        kind: TherapyType::Therapy,
        location: "Madrid",
        base_price: 70.0,
        currency: "EUR",
        duration: "1h",
        capacity: Some(1),
    },
    DemoTherapy {
        guide: 1,
        slug: "retiro-de-silencio-sierra",
        title: "Retiro de Silencio en la Sierra",
        description: "Fin de semana de meditación y silencio en la sierra de Madrid.",
        kind: TherapyType::Event,
        location: "Sierra de Guadarrama",
        base_price: 220.0,
        currency: "EUR",
        duration: "2 días",
        capacity: Some(20),
    },
    DemoTherapy {
        guide: 2,
        slug: "temazcal-tradicional",
        title: "Temazcal Tradicional",
        description: "Baño de vapor ancestral con cantos y plantas medicinales.",
        kind: TherapyType::Ceremony,
        location: "Tepoztlán",
        base_price: 900.0,
        currency: "MXN",
        duration: "4h",
        capacity: Some(12),
    },
    DemoTherapy {
        guide: 2,
        slug: "kit-de-hierbas-medicinales",
        title: "Kit de Hierbas Medicinales",
        description: "Selección de hierbas para infusiones y baños de limpieza.",
        kind: TherapyType::Product,
        location: "Envío nacional",
        base_price: 350.0,
        currency: "MXN",
        duration: "",
        capacity: None,
    },
    DemoTherapy {
        guide: 3,
        slug: "viaje-sonoro-oaxaca",
        title: "Viaje Sonoro",
        description: "Baño de sonido con cuencos tibetanos, gong y tambor.",
        kind: TherapyType::Event,
        location: "Oaxaca",
        base_price: 500.0,
        currency: "MXN",
        duration: "2h",
        capacity: Some(25),
    },
    DemoTherapy {
        guide: 3,
        slug: "cuenco-tibetano-artesanal",
        title: "Cuenco Tibetano Artesanal",
        description: "Cuenco de siete metales afinado a mano.",
        kind: TherapyType::Product,
        location: "Oaxaca",
        base_price: 1800.0,
        currency: "MXN",
        duration: "",
        capacity: None,
    },
];

/// Fixed creation time so demo responses are stable
fn seeded_at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

static DEMO_GUIDES: Lazy<Vec<Guide>> = Lazy::new(|| {
    GUIDES
        .iter()
        .enumerate()
        .map(|(i, g)| Guide {
            id: i as i64 + 1,
            user_id: None,
            slug: g.slug.to_string(),
            name: g.name.to_string(),
            bio: g.bio.to_string(),
            country: g.country.to_string(),
            city: g.city.to_string(),
            photo_url: None,
            specialties: g.specialties.iter().map(|s| s.to_string()).collect(),
            whatsapp: None,
            verified: g.verified,
            created_at: seeded_at(),
            updated_at: seeded_at(),
        })
        .collect()
});

static DEMO_THERAPIES: Lazy<Vec<TherapyListing>> = Lazy::new(|| {
    THERAPIES
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            let guide = DEMO_GUIDES.get(t.guide)?;
            Some(TherapyListing {
                therapy: Therapy {
                    id: i as i64 + 1,
                    guide_id: guide.id,
                    slug: t.slug.to_string(),
                    title: t.title.to_string(),
                    description: t.description.to_string(),
                    therapy_type: t.kind,
                    country: guide.country.clone(),
                    location: t.location.to_string(),
                    base_price: t.base_price,
                    currency: t.currency.to_string(),
                    duration: t.duration.to_string(),
                    capacity: t.capacity,
                    image_url: None,
                    is_published: true,
                    status: TherapyStatus::Approved,
                    rejection_reason: None,
                    created_at: seeded_at(),
                    updated_at: seeded_at(),
                },
                guide_name: guide.name.clone(),
                guide_slug: guide.slug.clone(),
                guide_verified: guide.verified,
            })
        })
        .collect()
});

/// Demo listings, all approved and published
pub fn therapies() -> Vec<TherapyListing> {
    DEMO_THERAPIES.clone()
}

pub fn guides() -> Vec<Guide> {
    DEMO_GUIDES.clone()
}

/// Look up a demo listing by numeric id or slug
pub fn find_therapy(id_or_slug: &str) -> Option<TherapyListing> {
    DEMO_THERAPIES
        .iter()
        .find(|l| matches_id_or_slug(l.therapy.id, &l.therapy.slug, id_or_slug))
        .cloned()
}

pub fn find_guide(id_or_slug: &str) -> Option<Guide> {
    DEMO_GUIDES
        .iter()
        .find(|g| matches_id_or_slug(g.id, &g.slug, id_or_slug))
        .cloned()
}

fn matches_id_or_slug(id: i64, slug: &str, needle: &str) -> bool {
    match needle.parse::<i64>() {
        Ok(n) => n == id,
        Err(_) => slug == needle,
    }
}
