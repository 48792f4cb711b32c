//! Seed data for `--offline`.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use sborr_client::MemoryBackend;
use sborr_core::defaults::{DOCUMENTS_TABLE, SESSIONS_TABLE, SESSION_DOCUMENTS_TABLE, USERS_TABLE};

pub const EMAIL: &str = "secretary@sborr.local";
pub const PASSWORD: &str = "sborr-demo";

/// A memory backend with a small council: three users, four documents and
/// three sessions around today.
pub fn backend() -> MemoryBackend {
    let secretary = Uuid::new_v4();
    let councilor = Uuid::new_v4();
    let memory = MemoryBackend::new().with_account(EMAIL, PASSWORD, secretary);
    let now = Utc::now();
    let at = |days: i64| (now + Duration::days(days)).to_rfc3339();

    memory.seed(
        USERS_TABLE,
        vec![
            user(secretary, "Liza", "Manalo", EMAIL, "secretary", &at(-400)),
            user(
                councilor,
                "Ramon",
                "Aquino",
                "r.aquino@sborr.local",
                "councilor",
                &at(-390),
            ),
            user(
                Uuid::new_v4(),
                "Teresa",
                "Villanueva",
                "mayor@sborr.local",
                "mayor",
                &at(-380),
            ),
        ],
    );

    let documents = vec![
        document(
            "An Ordinance Regulating Tricycle Fares",
            "ordinance",
            "in_session",
            councilor,
            &at(-20),
        ),
        document(
            "Resolution Adopting the Annual Budget",
            "resolution",
            "approved",
            councilor,
            &at(-45),
        ),
        document(
            "Memorandum on Session Hall Repairs",
            "memorandum",
            "archived",
            secretary,
            &at(-90),
        ),
        document(
            "Ordinance on Market Stall Rentals",
            "ordinance",
            "draft",
            councilor,
            &at(-2),
        ),
    ];

    let today = session("regular_session", "Session Hall", "in_session", &at(0), &at(-7));
    let upcoming = session("special_session", "Municipal Gym", "scheduled", &at(3), &at(-1));
    let past = session("regular_session", "Session Hall", "completed", &at(-14), &at(-21));

    let agendas = vec![
        agenda(&today, &documents[0], &at(-6)),
        agenda(&upcoming, &documents[3], &at(-1)),
        agenda(&past, &documents[1], &at(-20)),
    ];

    memory.seed(DOCUMENTS_TABLE, documents);
    memory.seed(SESSIONS_TABLE, vec![today, upcoming, past]);
    memory.seed(SESSION_DOCUMENTS_TABLE, agendas);
    memory
}

fn user(id: Uuid, first: &str, last: &str, email: &str, role: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "firstname": first,
        "lastname": last,
        "email": email,
        "role": role,
        "bio": null,
        "avatar_url": null,
        "avatar_path": null,
        "created_at": created_at
    })
}

fn document(title: &str, kind: &str, status: &str, author: Uuid, created_at: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "title": title,
        "description": null,
        "type": kind,
        "status": status,
        "series": created_at.get(..4).unwrap_or("2025"),
        "author_name": "Hon. Ramon Aquino",
        "created_by": author,
        "file_name": null,
        "file_path": null,
        "file_url": null,
        "created_at": created_at
    })
}

fn session(kind: &str, venue: &str, status: &str, scheduled_at: &str, created_at: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "type": kind,
        "venue": venue,
        "scheduled_at": scheduled_at,
        "status": status,
        "created_at": created_at
    })
}

fn agenda(session: &Value, document: &Value, created_at: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "session_id": session["id"],
        "document_id": document["id"],
        "created_at": created_at
    })
}
