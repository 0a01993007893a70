// ============================
// crates/backend-lib/src/seed.rs
// ============================
//! Demo directory for a fresh store.

use chrono::{Days, NaiveDate};
use slotbook_common::{Availability, Expert, TimeSlot};
use tracing::info;

use crate::storage::{Storage, StorageError};

/// Bookable labels generated for every seeded day
pub const SLOT_LABELS: [&str; 8] = [
    "09:00 AM", "10:00 AM", "11:00 AM", "12:00 PM", "02:00 PM", "03:00 PM", "04:00 PM",
    "05:00 PM",
];

struct DemoExpert {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    experience: u32,
    rating: f32,
    bio: &'static str,
    avatar: &'static str,
}

const DEMO_EXPERTS: [DemoExpert; 10] = [
    DemoExpert {
        id: "aisha-mehta",
        name: "Dr. Aisha Mehta",
        category: "Machine Learning",
        experience: 12,
        rating: 4.9,
        bio: "Principal researcher at a leading AI lab. Specializes in NLP and transformer architectures.",
        avatar: "https://i.pravatar.cc/150?img=47",
    },
    DemoExpert {
        id: "carlos-rivera",
        name: "Carlos Rivera",
        category: "System Design",
        experience: 15,
        rating: 4.8,
        bio: "Staff engineer with experience scaling distributed systems at high-growth startups.",
        avatar: "https://i.pravatar.cc/150?img=12",
    },
    DemoExpert {
        id: "priya-nair",
        name: "Priya Nair",
        category: "Frontend",
        experience: 8,
        rating: 4.7,
        bio: "Frontend architect focused on performance, accessibility, and design systems.",
        avatar: "https://i.pravatar.cc/150?img=45",
    },
    DemoExpert {
        id: "james-otieno",
        name: "James Otieno",
        category: "Backend",
        experience: 10,
        rating: 4.6,
        bio: "Backend engineer specializing in microservices and event-driven architecture.",
        avatar: "https://i.pravatar.cc/150?img=68",
    },
    DemoExpert {
        id: "lena-vogel",
        name: "Lena Vogel",
        category: "DevOps",
        experience: 9,
        rating: 4.5,
        bio: "DevOps lead with deep expertise in Kubernetes, Terraform, and CI/CD pipelines.",
        avatar: "https://i.pravatar.cc/150?img=36",
    },
    DemoExpert {
        id: "ravi-shankar",
        name: "Ravi Shankar",
        category: "Machine Learning",
        experience: 7,
        rating: 4.4,
        bio: "ML engineer building production recommendation systems and computer vision pipelines.",
        avatar: "https://i.pravatar.cc/150?img=60",
    },
    DemoExpert {
        id: "sakura-tanaka",
        name: "Sakura Tanaka",
        category: "Frontend",
        experience: 6,
        rating: 4.6,
        bio: "Specializes in React performance optimization and micro-frontend architecture.",
        avatar: "https://i.pravatar.cc/150?img=44",
    },
    DemoExpert {
        id: "omar-hassan",
        name: "Omar Hassan",
        category: "System Design",
        experience: 11,
        rating: 4.7,
        bio: "Engineering manager with expertise in database sharding and cache design patterns.",
        avatar: "https://i.pravatar.cc/150?img=15",
    },
    DemoExpert {
        id: "sofia-almeida",
        name: "Sofia Almeida",
        category: "Backend",
        experience: 8,
        rating: 4.5,
        bio: "Specializes in RESTful API design, GraphQL, and database optimization.",
        avatar: "https://i.pravatar.cc/150?img=32",
    },
    DemoExpert {
        id: "nathan-brooks",
        name: "Nathan Brooks",
        category: "DevOps",
        experience: 13,
        rating: 4.8,
        bio: "Site reliability engineer who has architected zero-downtime deployments at scale.",
        avatar: "https://i.pravatar.cc/150?img=11",
    },
];

/// Free calendar for the `days` days after `today`
pub fn demo_calendar(today: NaiveDate, days: u32) -> Vec<Availability> {
    (1..=u64::from(days))
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| Availability {
            date,
            slots: SLOT_LABELS.iter().map(|label| TimeSlot::free(*label)).collect(),
        })
        .collect()
}

/// The demo directory with availability starting the day after `today`
pub fn demo_experts(today: NaiveDate, days: u32) -> Vec<Expert> {
    DEMO_EXPERTS
        .iter()
        .map(|demo| Expert {
            id: demo.id.to_string(),
            name: demo.name.to_string(),
            category: demo.category.to_string(),
            experience: demo.experience,
            rating: demo.rating,
            bio: demo.bio.to_string(),
            avatar: demo.avatar.to_string(),
            availability: demo_calendar(today, days),
        })
        .collect()
}

/// Write the demo directory if the store holds no experts; returns how many were written
pub async fn seed_if_empty<S: Storage + ?Sized>(
    storage: &S,
    today: NaiveDate,
    days: u32,
) -> Result<usize, StorageError> {
    if storage.expert_count().await? > 0 {
        return Ok(0);
    }
    let experts = demo_experts(today, days);
    let count = experts.len();
    for expert in experts {
        storage.upsert_expert(expert).await?;
    }
    info!(experts = count, days, "seeded demo directory");
    Ok(count)
}
