use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Customer, Package, ServiceAvailability, ServiceListing, ServiceOffering, VendorContact};

// ── Services ──

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<ServiceListing>> {
    let row = conn
        .query_row(
            "SELECT id, vendor_id, company_name, category, availability, packages, offerings, contact_phone, contact_email
             FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((id, vendor_id, company_name, category, availability, packages, offerings, phone, email)) = row
    else {
        return Ok(None);
    };

    let packages: Vec<Package> = serde_json::from_str(&packages)?;
    let offerings: Vec<ServiceOffering> = serde_json::from_str(&offerings).unwrap_or_default();

    Ok(Some(ServiceListing {
        id,
        vendor_id,
        company_name,
        category,
        availability: ServiceAvailability::parse(&availability),
        packages,
        offerings,
        contact: VendorContact { phone, email },
    }))
}

pub fn save_service(conn: &Connection, listing: &ServiceListing) -> anyhow::Result<()> {
    let packages = serde_json::to_string(&listing.packages)?;
    let offerings = serde_json::to_string(&listing.offerings)?;

    conn.execute(
        "INSERT INTO services (id, vendor_id, company_name, category, availability, packages, offerings, contact_phone, contact_email)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           vendor_id = excluded.vendor_id,
           company_name = excluded.company_name,
           category = excluded.category,
           availability = excluded.availability,
           packages = excluded.packages,
           offerings = excluded.offerings,
           contact_phone = excluded.contact_phone,
           contact_email = excluded.contact_email,
           updated_at = datetime('now')",
        params![
            listing.id,
            listing.vendor_id,
            listing.company_name,
            listing.category,
            listing.availability.as_str(),
            packages,
            offerings,
            listing.contact.phone,
            listing.contact.email,
        ],
    )?;
    Ok(())
}

// ── Customers ──

pub fn get_customer(conn: &Connection, id: &str) -> anyhow::Result<Option<Customer>> {
    let customer = conn
        .query_row(
            "SELECT id, name, email, phone FROM customers WHERE id = ?1",
            params![id],
            |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    phone: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(customer)
}

pub fn save_customer(conn: &Connection, customer: &Customer) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO customers (id, name, email, phone) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           email = excluded.email,
           phone = excluded.phone",
        params![customer.id, customer.name, customer.email, customer.phone],
    )?;
    Ok(())
}
