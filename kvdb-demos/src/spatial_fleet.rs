//! Tracks a small fleet of vehicles as JSON-encoded points and answers a
//! "what's near me" query through a spatial index.

use kvdb::{Database, Rect, SetOptions};
use rand::Rng;

fn encode(lon: f64, lat: f64) -> Vec<u8> {
    format!(r#"{{"lon":{lon},"lat":{lat}}}"#).into_bytes()
}

fn rect_of(value: &[u8]) -> Option<Rect> {
    let doc: serde_json::Value = serde_json::from_slice(value).ok()?;
    let lon = doc.get("lon")?.as_f64()?;
    let lat = doc.get("lat")?.as_f64()?;
    Some(Rect::point(vec![lon, lat]))
}

fn main() {
    env_logger::init();

    let db = Database::open_memory();
    db.create_spatial_index("fleet", b"vehicle:*", false, std::sync::Arc::new(rect_of))
        .expect("create spatial index");

    let mut rng = rand::thread_rng();
    db.update(|tx| {
        for i in 0..50 {
            let lon = -122.5 + rng.gen_range(-0.2..0.2);
            let lat = 37.7 + rng.gen_range(-0.2..0.2);
            tx.set(format!("vehicle:{i}").as_bytes(), &encode(lon, lat), SetOptions::none())?;
        }
        // A few vehicles parked right downtown, for the query below to find.
        tx.set(b"vehicle:downtown-1", &encode(-122.42, 37.78), SetOptions::none())?;
        tx.set(b"vehicle:downtown-2", &encode(-122.41, 37.77), SetOptions::none())?;
        Ok(())
    })
    .expect("seed fleet");

    let query = Rect::new(vec![-122.43, 37.76], vec![-122.40, 37.79]);
    let mut nearby = Vec::new();
    db.view(|tx| {
        tx.intersects("fleet", &query, |item| {
            nearby.push(String::from_utf8_lossy(&item.key).into_owned());
            true
        })
    })
    .expect("spatial query");

    println!("vehicles within downtown bounding box:");
    for key in &nearby {
        println!("  {key}");
    }
    assert!(nearby.contains(&"vehicle:downtown-1".to_string()));
    assert!(nearby.contains(&"vehicle:downtown-2".to_string()));
}
