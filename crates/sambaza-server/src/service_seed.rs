use chrono::Utc;
use sambaza_storage::store::ServiceRow;
use sambaza_storage::Store;

/// Default service catalog for first-time startup.
struct ServiceDef {
    code: &'static str,
    name: &'static str,
    description: &'static str,
}

const DEFAULT_SERVICES: &[ServiceDef] = &[
    ServiceDef {
        code: "sms",
        name: "批量短信",
        description: "群发短信与送达跟踪",
    },
    ServiceDef {
        code: "whatsapp",
        name: "WhatsApp 消息",
        description: "经网关下发 WhatsApp 消息",
    },
    ServiceDef {
        code: "email",
        name: "邮件群发",
        description: "SMTP 邮件群发",
    },
    ServiceDef {
        code: "ussd",
        name: "USSD 菜单",
        description: "USSD 服务代码与菜单托管",
    },
    ServiceDef {
        code: "mpesa",
        name: "M-Pesa 收款",
        description: "STK push 收款与对账",
    },
    ServiceDef {
        code: "airtime",
        name: "话费充值",
        description: "子账号话费充值",
    },
    ServiceDef {
        code: "survey",
        name: "问卷调查",
        description: "USSD/短信问卷与回答统计",
    },
    ServiceDef {
        code: "service_desk",
        name: "服务台",
        description: "工单受理与跟进",
    },
];

/// Initialize the service catalog if the database has no services yet.
pub async fn init_default_services(store: &Store) -> anyhow::Result<usize> {
    if store.count_services().await? > 0 {
        tracing::debug!("Service catalog already seeded, skipping");
        return Ok(0);
    }

    let mut created = 0usize;
    for def in DEFAULT_SERVICES {
        let row = ServiceRow {
            id: sambaza_common::id::next_id(),
            code: def.code.to_string(),
            name: def.name.to_string(),
            description: Some(def.description.to_string()),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match store.insert_service(&row).await {
            Ok(_) => created += 1,
            Err(e) => {
                tracing::error!(code = def.code, error = %e, "Failed to seed service");
            }
        }
    }
    tracing::info!(created, "Service catalog seeded");
    Ok(created)
}

/// Import services from a JSON seed file; existing codes are skipped.
pub async fn init_from_seed_file(store: &Store, seed_path: &str) -> anyhow::Result<()> {
    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: crate::config::ServicesSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let mut created = 0u32;
    let mut skipped = 0u32;
    for svc in &seed.services {
        match store.get_service_by_code(&svc.code).await? {
            Some(_) => {
                tracing::warn!(code = %svc.code, "Service already exists, skipping");
                skipped += 1;
            }
            None => {
                let row = ServiceRow {
                    id: sambaza_common::id::next_id(),
                    code: svc.code.clone(),
                    name: svc.name.clone(),
                    description: svc.description.clone(),
                    enabled: svc.enabled,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                match store.insert_service(&row).await {
                    Ok(_) => created += 1,
                    Err(e) => {
                        tracing::error!(code = %svc.code, error = %e, "Failed to create service");
                    }
                }
            }
        }
    }
    tracing::info!(created, skipped, "init-services completed");
    Ok(())
}
