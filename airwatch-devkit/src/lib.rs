/*!
# Airwatch DevKit - Stubs et utilitaires pour le développement

Bibliothèque pour tester le pipeline d'enregistrement sans l'API PurpleAir:
- Capteur scripté (réponses et erreurs programmées)
- Fixtures de réponses PurpleAir réalistes
- Harness de test: répertoire temporaire + lecture des historiques SQLite/CSV
*/

pub mod fixtures;
pub mod sensor_stub;
pub mod test_utils;

pub use sensor_stub::ScriptedSensor;
pub use test_utils::TestHarness;
