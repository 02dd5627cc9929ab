use crate::config::SeedConfig;
use crate::domain::models::{ComplaintCategory, Role};
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use sqlx::PgPool;
use uuid::Uuid;

struct SeedAgency<'a> {
    name: &'a str,
    slug: &'a str,
    categories: &'a [ComplaintCategory],
}

const AGENCIES: [SeedAgency<'static>; 3] = [
    SeedAgency {
        name: "Rwanda Education Board (REB)",
        slug: "reb",
        categories: &[ComplaintCategory::Education],
    },
    SeedAgency {
        name: "Rwanda Water Board (RWB)",
        slug: "rwb",
        categories: &[ComplaintCategory::WaterSanitation],
    },
    SeedAgency {
        name: "Rwanda Revenue Authority (RRA)",
        slug: "rra",
        categories: &[ComplaintCategory::Taxes],
    },
];

pub async fn seed_all(pool: &PgPool, config: &SeedConfig) -> Result<()> {
    seed_agencies(pool).await?;

    match &config.admin_password {
        Some(password) => {
            seed_user(pool, &config.admin_email, password, "Admin User", Role::Admin, None).await?;
        }
        None => tracing::info!("SEED_ADMIN_PASSWORD not set, skipping admin seeding"),
    }

    if let Some(password) = &config.agency_admin_password {
        for agency in &AGENCIES {
            let agency_id: Uuid = sqlx::query_scalar("SELECT id FROM agencies WHERE slug = $1")
                .bind(agency.slug)
                .fetch_one(pool)
                .await?;
            seed_user(
                pool,
                &format!("admin@{}.gov.rw", agency.slug),
                password,
                &format!("{} Admin", agency.name),
                Role::AgencyAdmin,
                Some(agency_id),
            )
            .await?;
        }
    }
    Ok(())
}

async fn seed_agencies(pool: &PgPool) -> Result<()> {
    for agency in &AGENCIES {
        let inserted = sqlx::query(
            r#"
            INSERT INTO agencies (id, name, slug, categories)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(agency.name)
        .bind(agency.slug)
        .bind(agency.categories.to_vec())
        .execute(pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            tracing::info!("Created agency {}", agency.name);
        }
    }
    Ok(())
}

async fn seed_user(
    pool: &PgPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: Role,
    agency_id: Option<Uuid>,
) -> Result<()> {
    let salt = SaltString::generate(rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (id, email, hash, role, agency_id, full_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(hash)
    .bind(role)
    .bind(agency_id)
    .bind(full_name)
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        tracing::info!("Created {:?} account {}", role, email);
    }
    Ok(())
}
