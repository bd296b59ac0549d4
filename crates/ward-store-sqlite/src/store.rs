//! [`SqliteStore`]: the SQLite implementation of [`ClinicalStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use ward_core::{
  chart::ChartItem,
  concept::{Concept, ConceptName},
  location::LocalizedLocation,
  observation::{NewObservation, Observation},
  patient::{Order, Patient, User},
  store::{
    AppendOutcome, ClinicalStore, PatientRefresh, ReferenceSnapshot,
    ReferenceTable,
  },
  sync_state::SyncState,
};

use crate::{
  Error, Result,
  encode::{
    EncodedSnapshot, OBSERVATION_COLUMNS, ObservationRow, PATIENT_COLUMNS,
    RawChartItem, RawConcept, RawLocalizedLocation, RawObservation, RawOrder,
    RawPatient, RawSyncState, decode_dt, decode_user, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Ward clinical cache backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a private in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_sync_time(&self, column: &'static str, at: DateTime<Utc>) -> Result<()> {
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!("UPDATE sync_state SET {column} = ?1 WHERE id = 0"),
          params![at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// Counts from writing a batch of confirmed observations.
#[derive(Default)]
struct ConfirmedWrite {
  inserted:          usize,
  duplicates:        usize,
  rejected:          usize,
  superseded:        usize,
  /// Earliest encounter time among rejected rows, in epoch millis.
  earliest_rejected: Option<i64>,
}

fn references_exist(
  tx: &Transaction<'_>,
  patient_uuid: &str,
  concept_uuid: &str,
) -> rusqlite::Result<bool> {
  tx.query_row(
    "SELECT EXISTS (SELECT 1 FROM patients WHERE uuid = ?1)
        AND EXISTS (SELECT 1 FROM concepts WHERE uuid = ?2)",
    params![patient_uuid, concept_uuid],
    |r| r.get(0),
  )
}

/// Write server-confirmed rows: drop orphans, supersede matching cached rows,
/// skip uuids already present.
fn write_confirmed(
  tx: &Transaction<'_>,
  rows: &[ObservationRow],
) -> rusqlite::Result<ConfirmedWrite> {
  let mut counts = ConfirmedWrite::default();
  let mut supersede = tx.prepare(
    "DELETE FROM observations
     WHERE temp_cache = 1
       AND (uuid = ?1
            OR (patient_uuid = ?2 AND concept_uuid = ?3 AND encounter_millis = ?4))",
  )?;
  let mut insert = tx.prepare(
    "INSERT OR IGNORE INTO observations (
       uuid, patient_uuid, encounter_uuid, encounter_millis,
       concept_uuid, value, temp_cache
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
  )?;

  for row in rows {
    if !references_exist(tx, &row.patient_uuid, &row.concept_uuid)? {
      tracing::warn!(
        observation = %row.uuid,
        patient = %row.patient_uuid,
        concept = %row.concept_uuid,
        "skipping observation with unknown patient or concept"
      );
      counts.rejected += 1;
      counts.earliest_rejected = Some(match counts.earliest_rejected {
        Some(earliest) => earliest.min(row.encounter_millis),
        None => row.encounter_millis,
      });
      continue;
    }

    counts.superseded += supersede.execute(params![
      row.uuid,
      row.patient_uuid,
      row.concept_uuid,
      row.encounter_millis,
    ])?;

    let written = insert.execute(params![
      row.uuid,
      row.patient_uuid,
      row.encounter_uuid,
      row.encounter_millis,
      row.concept_uuid,
      row.value,
    ])?;
    if written == 0 {
      counts.duplicates += 1;
    } else {
      counts.inserted += 1;
    }
  }

  Ok(counts)
}

fn write_reference_table(
  tx: &Transaction<'_>,
  table: ReferenceTable,
  snap: &EncodedSnapshot,
) -> rusqlite::Result<()> {
  tx.execute(&format!("DELETE FROM {table}"), [])?;

  match table {
    ReferenceTable::Locations => {
      let mut stmt = tx.prepare(
        "INSERT INTO locations (location_uuid, parent_uuid) VALUES (?1, ?2)",
      )?;
      for (uuid, parent) in &snap.locations {
        stmt.execute(params![uuid, parent])?;
      }
    }
    ReferenceTable::LocationNames => {
      let mut stmt = tx.prepare(
        "INSERT INTO location_names (location_uuid, locale, name) VALUES (?1, ?2, ?3)",
      )?;
      for (uuid, locale, name) in &snap.location_names {
        stmt.execute(params![uuid, locale, name])?;
      }
    }
    ReferenceTable::Concepts => {
      let mut stmt = tx.prepare(
        "INSERT INTO concepts (uuid, xform_id, concept_type) VALUES (?1, ?2, ?3)",
      )?;
      for (uuid, xform_id, concept_type) in &snap.concepts {
        stmt.execute(params![uuid, xform_id, concept_type])?;
      }
    }
    ReferenceTable::ConceptNames => {
      let mut stmt = tx.prepare(
        "INSERT INTO concept_names (concept_uuid, locale, name) VALUES (?1, ?2, ?3)",
      )?;
      for (uuid, locale, name) in &snap.concept_names {
        stmt.execute(params![uuid, locale, name])?;
      }
    }
    ReferenceTable::ChartItems => {
      let mut section_stmt = tx.prepare(
        "INSERT INTO chart_items (chart_uuid, weight, section_type, label)
         VALUES (?1, ?2, ?3, ?4)",
      )?;
      let mut item_stmt = tx.prepare(
        "INSERT INTO chart_items (
           chart_uuid, weight, parent_id, label, type, required,
           concept_uuids, format, caption_format
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      )?;
      for (chart_uuid, sections) in &snap.charts {
        for section in sections {
          section_stmt.execute(params![
            chart_uuid,
            section.weight,
            section.section_type,
            section.label,
          ])?;
          let section_id = tx.last_insert_rowid();
          for item in &section.items {
            item_stmt.execute(params![
              chart_uuid,
              item.weight,
              section_id,
              item.label,
              item.item_type,
              item.required,
              item.concept_uuids,
              item.format,
              item.caption_format,
            ])?;
          }
        }
      }
    }
    ReferenceTable::Patients => {
      let mut stmt = tx.prepare(&format!(
        "INSERT INTO patients ({PATIENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
      ))?;
      for p in &snap.patients {
        stmt.execute(params![
          p.uuid,
          p.given_name,
          p.family_name,
          p.location_uuid,
          p.birthdate,
          p.gender,
        ])?;
      }
    }
    ReferenceTable::Orders => {
      let mut stmt = tx.prepare(
        "INSERT INTO orders (uuid, patient_uuid, instructions, start_time, stop_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
      )?;
      for o in &snap.orders {
        stmt.execute(params![
          o.uuid,
          o.patient_uuid,
          o.instructions,
          o.start_time,
          o.stop_time,
        ])?;
      }
    }
    ReferenceTable::Users => {
      let mut stmt =
        tx.prepare("INSERT INTO users (uuid, full_name) VALUES (?1, ?2)")?;
      for (uuid, full_name) in &snap.users {
        stmt.execute(params![uuid, full_name])?;
      }
    }
  }

  Ok(())
}

/// Decode a timestamp on the database thread, surfacing failures as
/// `tokio_rusqlite` errors so the enclosing transaction rolls back.
fn decode_watermark(
  s: Option<String>,
) -> tokio_rusqlite::Result<Option<DateTime<Utc>>> {
  s.as_deref()
    .map(decode_dt)
    .transpose()
    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

/// Result of attempting a locally-cached insert.
enum CachedInsert {
  Written(Vec<CachedRow>),
  /// Index of the first row with an unknown patient or concept.
  Orphan(usize),
}

/// Outcome for one row of a locally-cached insert.
enum CachedRow {
  /// Newly written, with its row id.
  Inserted(i64),
  /// Already stored under the same uuid, or confirmed with the same patient,
  /// concept and encounter time.
  Present(RawObservation),
}

// ─── ClinicalStore impl ──────────────────────────────────────────────────────

impl ClinicalStore for SqliteStore {
  type Error = Error;

  // ── Sync state ────────────────────────────────────────────────────────────

  async fn sync_state(&self) -> Result<SyncState> {
    let raw = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT full_sync_start_time, full_sync_end_time, obs_sync_time
           FROM sync_state WHERE id = 0",
          [],
          |row| {
            Ok(RawSyncState {
              full_sync_start_time: row.get(0)?,
              full_sync_end_time:   row.get(1)?,
              obs_sync_time:        row.get(2)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_sync_state()
  }

  async fn mark_full_sync_started(&self, at: DateTime<Utc>) -> Result<()> {
    self.set_sync_time("full_sync_start_time", at).await
  }

  async fn mark_full_sync_finished(&self, at: DateTime<Utc>) -> Result<()> {
    self.set_sync_time("full_sync_end_time", at).await
  }

  // ── Bulk writes ───────────────────────────────────────────────────────────

  async fn replace_reference_tables(&self, snapshot: ReferenceSnapshot) -> Result<()> {
    let encoded = EncodedSnapshot::from(&snapshot);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for table in ReferenceTable::iter() {
          write_reference_table(&tx, table, &encoded)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(
      locations = snapshot.locations.len(),
      concepts = snapshot.concepts.len(),
      patients = snapshot.patients.len(),
      "reference tables replaced"
    );
    Ok(())
  }

  async fn append_observations(
    &self,
    observations:  Vec<NewObservation>,
    snapshot_time: DateTime<Utc>,
  ) -> Result<AppendOutcome> {
    let rows: Vec<ObservationRow> = observations.iter().map(Into::into).collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let previous: Option<String> = tx.query_row(
          "SELECT obs_sync_time FROM sync_state WHERE id = 0",
          [],
          |r| r.get(0),
        )?;
        let previous = decode_watermark(previous)?;

        let counts = write_confirmed(&tx, &rows)?;

        // Rejected rows must be fetched again once their patient or concept
        // is cached, so the watermark stops just short of the earliest one.
        let target = match counts
          .earliest_rejected
          .and_then(|millis| DateTime::<Utc>::from_timestamp_millis(millis - 1))
        {
          Some(held) if held < snapshot_time => held,
          _ => snapshot_time,
        };

        let watermark = match previous {
          Some(prev) if prev >= target => Some(prev),
          _ => {
            tx.execute(
              "UPDATE sync_state SET obs_sync_time = ?1 WHERE id = 0",
              params![encode_dt(target)],
            )?;
            Some(target)
          }
        };

        tx.commit()?;

        Ok(AppendOutcome {
          inserted: counts.inserted,
          duplicates: counts.duplicates,
          rejected: counts.rejected,
          superseded: counts.superseded,
          previous_watermark: previous,
          watermark,
        })
      })
      .await?;

    Ok(outcome)
  }

  async fn replace_patient_observations(
    &self,
    patient_uuid: Uuid,
    observations: Vec<NewObservation>,
  ) -> Result<PatientRefresh> {
    let patient_str = encode_uuid(patient_uuid);
    let rows: Vec<ObservationRow> = observations
      .iter()
      .filter(|o| o.patient_uuid == patient_uuid)
      .map(Into::into)
      .collect();

    let refresh = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let removed = tx.execute(
          "DELETE FROM observations WHERE patient_uuid = ?1 AND temp_cache = 0",
          params![patient_str],
        )?;
        let counts = write_confirmed(&tx, &rows)?;
        tx.commit()?;

        Ok(PatientRefresh {
          removed,
          inserted: counts.inserted,
          rejected: counts.rejected,
          superseded: counts.superseded,
        })
      })
      .await?;

    Ok(refresh)
  }

  async fn insert_cached_observations(
    &self,
    observations: Vec<NewObservation>,
  ) -> Result<Vec<Observation>> {
    let rows: Vec<ObservationRow> = observations.iter().map(Into::into).collect();

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = Vec::with_capacity(rows.len());
        {
          let mut existing = tx.prepare(&format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations
             WHERE uuid = ?1
                OR (temp_cache = 0 AND patient_uuid = ?2 AND concept_uuid = ?3
                    AND encounter_millis = ?4)
             ORDER BY temp_cache ASC, id ASC
             LIMIT 1"
          ))?;
          let mut insert = tx.prepare(
            "INSERT INTO observations (
               uuid, patient_uuid, encounter_uuid, encounter_millis,
               concept_uuid, value, temp_cache
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
          )?;

          for (idx, row) in rows.iter().enumerate() {
            if !references_exist(&tx, &row.patient_uuid, &row.concept_uuid)? {
              // Dropping `tx` rolls back anything written so far.
              return Ok(CachedInsert::Orphan(idx));
            }
            // An incremental sync may already have pulled the confirmed copy.
            let found = existing
              .query_row(
                params![
                  row.uuid,
                  row.patient_uuid,
                  row.concept_uuid,
                  row.encounter_millis,
                ],
                RawObservation::from_row,
              )
              .optional()?;
            if let Some(raw) = found {
              written.push(CachedRow::Present(raw));
              continue;
            }
            insert.execute(params![
              row.uuid,
              row.patient_uuid,
              row.encounter_uuid,
              row.encounter_millis,
              row.concept_uuid,
              row.value,
            ])?;
            written.push(CachedRow::Inserted(tx.last_insert_rowid()));
          }
        }
        tx.commit()?;
        Ok(CachedInsert::Written(written))
      })
      .await?;

    match result {
      CachedInsert::Orphan(idx) => {
        let o = &observations[idx];
        Err(Error::OrphanObservation {
          observation: o.uuid,
          patient:     o.patient_uuid,
          concept:     o.concept_uuid.clone(),
        })
      }
      CachedInsert::Written(written) => {
        let present = written
          .iter()
          .filter(|r| matches!(r, CachedRow::Present(_)))
          .count();
        if present > 0 {
          tracing::debug!(present, "cached insert found rows already stored");
        }
        observations
          .into_iter()
          .zip(written)
          .map(|(o, row)| match row {
            CachedRow::Present(raw) => raw.into_observation(),
            CachedRow::Inserted(id) => Ok(Observation {
              id,
              uuid: o.uuid,
              patient_uuid: o.patient_uuid,
              encounter_uuid: o.encounter_uuid,
              encounter_time: o.encounter_time,
              concept_uuid: o.concept_uuid,
              value: o.value,
              temp_cache: true,
            }),
          })
          .collect()
      }
    }
  }

  async fn delete_observation(&self, uuid: Uuid) -> Result<bool> {
    let uuid_str = encode_uuid(uuid);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM observations WHERE uuid = ?1",
          params![uuid_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_observation(&self, uuid: Uuid) -> Result<Option<Observation>> {
    let uuid_str = encode_uuid(uuid);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE uuid = ?1"),
              params![uuid_str],
              RawObservation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawObservation::into_observation).transpose()
  }

  async fn observations_for_patient(&self, patient_uuid: Uuid) -> Result<Vec<Observation>> {
    let patient_str = encode_uuid(patient_uuid);
    let raws: Vec<RawObservation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {OBSERVATION_COLUMNS} FROM observations
           WHERE patient_uuid = ?1
           ORDER BY encounter_millis ASC, id ASC"
        ))?;
        let rows = stmt
          .query_map(params![patient_str], RawObservation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawObservation::into_observation).collect()
  }

  async fn get_patient(&self, uuid: Uuid) -> Result<Option<Patient>> {
    let uuid_str = encode_uuid(uuid);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE uuid = ?1"),
              params![uuid_str],
              RawPatient::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPatient::into_patient).transpose()
  }

  async fn list_patients(&self, location_uuid: Option<Uuid>) -> Result<Vec<Patient>> {
    let location_str = location_uuid.map(encode_uuid);

    let raws: Vec<RawPatient> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(loc) = location_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients
             WHERE location_uuid = ?1
             ORDER BY family_name, given_name"
          ))?;
          stmt
            .query_map(params![loc], RawPatient::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY family_name, given_name"
          ))?;
          stmt
            .query_map([], RawPatient::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPatient::into_patient).collect()
  }

  async fn concepts(&self) -> Result<Vec<Concept>> {
    let raws: Vec<RawConcept> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT uuid, xform_id, concept_type FROM concepts ORDER BY xform_id")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawConcept {
              uuid:         row.get(0)?,
              xform_id:     row.get(1)?,
              concept_type: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConcept::into_concept).collect()
  }

  async fn concept_exists(&self, uuid: &str) -> Result<bool> {
    let uuid = uuid.to_owned();
    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM concepts WHERE uuid = ?1)",
          params![uuid],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(exists)
  }

  async fn concept_names(&self, locale: &str) -> Result<Vec<ConceptName>> {
    let locale = locale.to_owned();
    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT concept_uuid, locale, name FROM concept_names WHERE locale = ?1",
        )?;
        let rows = stmt
          .query_map(params![locale], |row| {
            Ok(ConceptName {
              concept_uuid: row.get(0)?,
              locale:       row.get(1)?,
              name:         row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn chart_items(&self, chart_uuid: Uuid) -> Result<Vec<ChartItem>> {
    let chart_str = encode_uuid(chart_uuid);
    let raws: Vec<RawChartItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, chart_uuid, weight, section_type, parent_id, label, type,
                  required, concept_uuids, format, caption_format
           FROM chart_items
           WHERE chart_uuid = ?1
           ORDER BY weight ASC, id ASC",
        )?;
        let rows = stmt
          .query_map(params![chart_str], |row| {
            Ok(RawChartItem {
              id:             row.get(0)?,
              chart_uuid:     row.get(1)?,
              weight:         row.get(2)?,
              section_type:   row.get(3)?,
              parent_id:      row.get(4)?,
              label:          row.get(5)?,
              item_type:      row.get(6)?,
              required:       row.get(7)?,
              concept_uuids:  row.get(8)?,
              format:         row.get(9)?,
              caption_format: row.get(10)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChartItem::into_chart_item).collect()
  }

  async fn localized_locations(
    &self,
    locale:         &str,
    default_locale: &str,
  ) -> Result<Vec<LocalizedLocation>> {
    let locale = locale.to_owned();
    let default_locale = default_locale.to_owned();

    let raws: Vec<RawLocalizedLocation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             l.location_uuid,
             l.parent_uuid,
             COALESCE(n.name, d.name, l.location_uuid) AS name,
             (SELECT COUNT(*) FROM patients p
               WHERE p.location_uuid = l.location_uuid) AS patient_count
           FROM locations l
           LEFT JOIN location_names n
             ON n.location_uuid = l.location_uuid AND n.locale = ?1
           LEFT JOIN location_names d
             ON d.location_uuid = l.location_uuid AND d.locale = ?2
           ORDER BY name",
        )?;
        let rows = stmt
          .query_map(params![locale, default_locale], |row| {
            Ok(RawLocalizedLocation {
              uuid:          row.get(0)?,
              parent_uuid:   row.get(1)?,
              name:          row.get(2)?,
              patient_count: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawLocalizedLocation::into_localized)
      .collect()
  }

  async fn orders_for_patient(&self, patient_uuid: Uuid) -> Result<Vec<Order>> {
    let patient_str = encode_uuid(patient_uuid);
    let raws: Vec<RawOrder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT uuid, patient_uuid, instructions, start_time, stop_time
           FROM orders WHERE patient_uuid = ?1",
        )?;
        let rows = stmt
          .query_map(params![patient_str], |row| {
            Ok(RawOrder {
              uuid:         row.get(0)?,
              patient_uuid: row.get(1)?,
              instructions: row.get(2)?,
              start_time:   row.get(3)?,
              stop_time:    row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut orders = raws
      .into_iter()
      .map(RawOrder::into_order)
      .collect::<Result<Vec<_>>>()?;
    orders.sort_by_key(|o| o.start_time);
    Ok(orders)
  }

  async fn list_users(&self) -> Result<Vec<User>> {
    let raws: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT uuid, full_name FROM users ORDER BY full_name")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(uuid, name)| decode_user(&uuid, name))
      .collect()
  }
}
